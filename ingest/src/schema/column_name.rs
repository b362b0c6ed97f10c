/// Length of the abbreviation a folded name segment is cut down to.
const FOLDED_SEGMENT_LENGTH: usize = 2;

/// Lower-cases `name` and replaces every character outside `[a-z0-9_]` with `_`.
///
/// Applying it twice yields the same result as applying it once.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Shortens a column name to at most `max_length` characters, `0` meaning unlimited.
///
/// `_`-delimited segments longer than two characters are abbreviated to their first two
/// characters, left to right, until the name fits. A name that still does not fit is cut down to
/// its trailing `max_length` characters. The result only depends on the input, so the same field
/// always folds to the same column.
pub fn fold_column_name(name: &str, max_length: usize) -> String {
    if max_length == 0 || name.chars().count() <= max_length {
        return name.to_string();
    }

    let mut segments: Vec<String> = name.split('_').map(str::to_string).collect();
    for index in 0..segments.len() {
        if segments[index].chars().count() <= FOLDED_SEGMENT_LENGTH {
            continue;
        }

        segments[index] = segments[index]
            .chars()
            .take(FOLDED_SEGMENT_LENGTH)
            .collect();

        let candidate = segments.join("_");
        if candidate.chars().count() <= max_length {
            return candidate;
        }
    }

    let folded = segments.join("_");
    let skip = folded.chars().count().saturating_sub(max_length);
    folded.chars().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_name("User-Agent.Name Ä1");
        assert_eq!(once, "user_agent_name__1");
        assert_eq!(normalize_name(&once), once);
    }

    #[test]
    fn short_names_are_untouched() {
        assert_eq!(fold_column_name("event_id", 63), "event_id");
        assert_eq!(fold_column_name("a_very_long_column_name", 0), "a_very_long_column_name");
    }

    #[test]
    fn segments_are_abbreviated_left_to_right() {
        assert_eq!(fold_column_name("user_address_city", 12), "us_ad_city");
        assert_eq!(fold_column_name("user_address_city", 15), "us_address_city");
    }

    #[test]
    fn keeps_tail_when_abbreviation_is_not_enough() {
        assert_eq!(fold_column_name("ab_ac_ad", 6), "_ac_ad");
        assert_eq!(fold_column_name("first_second_third", 5), "se_th");
    }
}
