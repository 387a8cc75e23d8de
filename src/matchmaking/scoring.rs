/// Points per finishing place, indexed by how many non-forfeited players took part.
const SCORE_TABLE: [&[i64]; 4] = [&[10], &[10, 5], &[10, 6, 3], &[10, 6, 3, 1]];

/// Points awarded for a one-based `place` among `active_players` non-forfeiters.
///
/// Counts outside the table use the single-player row; places past the end
/// of a row earn nothing.
#[must_use]
pub fn points_for_place(active_players: usize, place: usize) -> i64 {
    let row = active_players
        .checked_sub(1)
        .and_then(|index| SCORE_TABLE.get(index))
        .copied()
        .unwrap_or(SCORE_TABLE[0]);
    place
        .checked_sub(1)
        .and_then(|index| row.get(index))
        .copied()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_rows() {
        assert_eq!(points_for_place(1, 1), 10);
        assert_eq!(points_for_place(2, 2), 5);
        assert_eq!(points_for_place(3, 3), 3);
        assert_eq!(
            (1..=4).map(|p| points_for_place(4, p)).collect::<Vec<_>>(),
            vec![10, 6, 3, 1]
        );
    }

    #[test]
    fn out_of_table_counts_fall_back_to_single_row() {
        assert_eq!(points_for_place(0, 1), 10);
        assert_eq!(points_for_place(7, 1), 10);
        assert_eq!(points_for_place(7, 2), 0);
    }

    #[test]
    fn places_beyond_row_earn_nothing() {
        assert_eq!(points_for_place(2, 3), 0);
        assert_eq!(points_for_place(4, 0), 0);
    }
}
