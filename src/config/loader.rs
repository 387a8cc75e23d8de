//! Configuration loading and environment parsing.

use super::Config;
use serde_json::{Map, Value};
use std::env;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

const ENV_OVERRIDE_PREFIX: &str = "TYPING_ARENA__";
const ENV_INLINE_JSON: &str = "TYPING_ARENA_CONFIG_JSON";
const ENV_STDIN_FLAG: &str = "TYPING_ARENA_CONFIG_STDIN";
const ENV_CONFIG_PATH: &str = "TYPING_ARENA_CONFIG_PATH";

/// Load configuration by layering sources over the compiled-in defaults.
///
/// Sources are merged in this order, so earlier entries win over later ones only
/// where the later ones are silent:
/// 1) `TYPING_ARENA_CONFIG_JSON` containing raw JSON
/// 2) JSON from stdin when `TYPING_ARENA_CONFIG_STDIN` is `1`/`true`/`yes`
/// 3) The file named by `TYPING_ARENA_CONFIG_PATH`
/// 4) `config.json` in the working directory
/// 5) `config.json` next to the executable
///
/// Individual fields are then overridden by `TYPING_ARENA__SECTION__FIELD=value`
/// variables, e.g. `TYPING_ARENA__MATCHMAKING__COUNTDOWN_SECS=5`.
///
/// Read and parse problems are reported on stderr and the offending source is
/// skipped. Validation is left to [`validate_config`](super::validate_config).
#[must_use]
pub fn load() -> Config {
    let defaults = Config::default();
    let mut merged = serde_json::to_value(&defaults).unwrap_or_else(|_| Value::Object(Map::new()));

    // Lowest precedence first so higher layers overwrite.
    for layer in collect_layers().into_iter().rev() {
        merge_values(&mut merged, layer);
    }

    apply_env_overrides(&mut merged, env::vars());

    match serde_json::from_value::<Config>(merged) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to deserialize config; using defaults: {err}");
            defaults
        }
    }
}

/// Parse a configuration document on top of the defaults without touching the environment.
pub fn from_json_str(raw: &str) -> anyhow::Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;
    merge_values(&mut merged, serde_json::from_str(raw)?);
    Ok(serde_json::from_value(merged)?)
}

/// Config documents in precedence order, highest first.
fn collect_layers() -> Vec<Value> {
    let mut layers = Vec::new();

    if let Ok(json) = env::var(ENV_INLINE_JSON) {
        layers.extend(parse_json_document(&json, ENV_INLINE_JSON));
    }

    if env::var(ENV_STDIN_FLAG).is_ok_and(|flag| env_var_truthy(&flag)) {
        let mut buf = String::new();
        match std::io::stdin().read_to_string(&mut buf) {
            Ok(_) => layers.extend(parse_json_document(&buf, "stdin")),
            Err(err) => eprintln!("Failed to read config from stdin: {err}"),
        }
    }

    let mut candidate_files: Vec<PathBuf> = Vec::new();
    if let Ok(path) = env::var(ENV_CONFIG_PATH) {
        candidate_files.push(PathBuf::from(path));
    }
    candidate_files.push(PathBuf::from("config.json"));
    if let Some(exe_dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidate_files.push(exe_dir.join("config.json"));
    }

    for path in candidate_files {
        layers.extend(read_file_source(&path));
    }

    layers
}

fn parse_json_document(raw: &str, label: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }

    serde_json::from_str(raw)
        .map_err(|err| eprintln!("Failed to parse config from {label}: {err}"))
        .ok()
}

fn read_file_source(path: &Path) -> Option<Value> {
    if path.as_os_str().is_empty() || !path.exists() {
        return None;
    }

    match fs::read_to_string(path) {
        Ok(contents) => parse_json_document(&contents, &format!("file {}", path.display())),
        Err(err) => {
            eprintln!("Failed to read config from {}: {err}", path.display());
            None
        }
    }
}

/// Deep-merge `source` into `target`; objects merge key by key, anything else replaces.
pub(crate) fn merge_values(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

pub(crate) fn apply_env_overrides<I>(root: &mut Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, raw_value) in vars {
        let Some(stripped) = key.strip_prefix(ENV_OVERRIDE_PREFIX) else {
            continue;
        };

        let path: Vec<String> = stripped
            .split("__")
            .filter(|segment| !segment.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();

        if let Some((leaf, parents)) = path.split_last() {
            let slot = parents.iter().fold(&mut *root, |node, segment| {
                ensure_object(node)
                    .entry(segment.clone())
                    .or_insert_with(|| Value::Object(Map::new()))
            });
            ensure_object(slot).insert(leaf.clone(), parse_env_value(&raw_value));
        }
    }
}

fn env_var_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// Env values are JSON scalars when they parse as such and plain strings otherwise.
fn parse_env_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::String(String::new());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) if !value.is_object() && !value.is_array() => value,
        _ => Value::String(trimmed.to_string()),
    }
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was coerced into an object above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn env_overrides_reach_nested_fields() {
        let mut root = serde_json::to_value(Config::default()).unwrap();
        apply_env_overrides(
            &mut root,
            vars(&[
                ("TYPING_ARENA__PORT", "9000"),
                ("TYPING_ARENA__MATCHMAKING__COUNTDOWN_SECS", "7"),
                ("TYPING_ARENA__SECURITY__JWT_ACCESS_SECRET", "s3cret"),
                ("UNRELATED__PORT", "1"),
            ]),
        );

        let config: Config = serde_json::from_value(root).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.matchmaking.countdown_secs, 7);
        assert_eq!(config.security.jwt_access_secret, "s3cret");
    }

    #[test]
    fn env_strings_that_look_like_json_containers_stay_strings() {
        assert_eq!(parse_env_value("true"), Value::Bool(true));
        assert_eq!(parse_env_value("12"), serde_json::json!(12));
        assert_eq!(
            parse_env_value("http://a.test,http://b.test"),
            Value::String("http://a.test,http://b.test".into())
        );
        assert_eq!(parse_env_value("[1,2]"), Value::String("[1,2]".into()));
    }

    #[test]
    fn merge_keeps_untouched_defaults() {
        let config = from_json_str(r#"{"matchmaking":{"forfeit_penalty":5}}"#).unwrap();
        assert_eq!(config.matchmaking.forfeit_penalty, 5);
        assert_eq!(config.matchmaking.countdown_secs, 3);
        assert_eq!(config.websocket.outbound_queue_capacity, 64);
    }

    #[test]
    fn invalid_log_level_falls_back_to_none() {
        let config = from_json_str(r#"{"logging":{"level":"loud"}}"#).unwrap();
        assert!(config.logging.level.is_none());
    }
}
