pub mod error;
pub mod identity;
pub mod token;

pub use error::AuthError;
pub use identity::{extract_credential, Identity, IdentityGate};
pub use token::{decode_access_token, encode_access_token, AccessClaims, ACCESS_TOKEN_TYPE};
