//! Extra-header line parsing.
//!
//! Custom request headers arrive as `"Name: value"` strings. Malformed lines
//! are reported to the caller so they can be logged and skipped.

/// Splits a `"Name: value"` header line into a trimmed key/value pair.
///
/// Only a line with no colon at all is malformed; name and value may each
/// be empty. Only the first colon splits, so values may themselves contain
/// colons (e.g. `Referer: https://example.com/`).
pub fn parse_header_line(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    Some((name.trim().to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_line_basic() {
        assert_eq!(
            parse_header_line("X-Api-Key: secret"),
            Some(("X-Api-Key".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn test_parse_header_line_trims_whitespace() {
        assert_eq!(
            parse_header_line("  Authorization :  Bearer abc  "),
            Some(("Authorization".to_string(), "Bearer abc".to_string()))
        );
    }

    #[test]
    fn test_parse_header_line_value_may_contain_colons() {
        assert_eq!(
            parse_header_line("Referer: https://example.com/a"),
            Some(("Referer".to_string(), "https://example.com/a".to_string()))
        );
    }

    #[test]
    fn test_parse_header_line_rejects_missing_colon() {
        assert_eq!(parse_header_line("badline"), None);
    }

    #[test]
    fn test_parse_header_line_accepts_empty_name() {
        assert_eq!(
            parse_header_line(": value"),
            Some((String::new(), "value".to_string()))
        );
    }

    #[test]
    fn test_parse_header_line_allows_empty_value() {
        assert_eq!(
            parse_header_line("X-Empty:"),
            Some(("X-Empty".to_string(), String::new()))
        );
    }

    // Property: the number of accepted lines equals the number of inputs
    // containing a colon.
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_accepted_count_matches_wellformed_count(
            lines in prop::collection::vec("[A-Za-z0-9:\\- ]{0,30}", 0..20)
        ) {
            let accepted = lines.iter().filter_map(|l| parse_header_line(l)).count();
            let wellformed = lines.iter().filter(|l| l.contains(':')).count();
            prop_assert_eq!(accepted, wellformed);
        }

        #[test]
        fn test_parsed_names_never_have_outer_whitespace(line in ".{0,60}") {
            if let Some((name, value)) = parse_header_line(&line) {
                prop_assert_eq!(name.trim(), name.as_str());
                prop_assert_eq!(value.trim(), value.as_str());
            }
        }
    }
}
