//! Property-based tests for the pure translation functions.

use lorecraft_core::store::sqlite::{convert_websearch_to_fts5, parse_dsn};
use proptest::collection::vec;
use proptest::prelude::*;

proptest! {
    /// Bare terms are all preserved and joined with AND.
    #[test]
    fn fts_bare_terms_joined_with_and(words in vec("[a-z]{1,12}", 1..6)) {
        let query = words.join(" ");
        let translated = convert_websearch_to_fts5(&query);

        for word in &words {
            // AND/OR/NOT inputs are operators, not terms.
            let upper = word.to_uppercase();
            if upper == "AND" || upper == "OR" || upper == "NOT" {
                continue;
            }
            prop_assert!(translated.contains(word.as_str()), "missing {word} in {translated}");
        }
        prop_assert!(!translated.starts_with("AND "));
        prop_assert!(!translated.ends_with(" AND"));
    }

    /// Translation is deterministic.
    #[test]
    fn fts_translation_deterministic(query in "[a-zA-Z0-9 \\-*\"]{0,40}") {
        prop_assert_eq!(
            convert_websearch_to_fts5(&query),
            convert_websearch_to_fts5(&query)
        );
    }

    /// A leading dash always becomes a NOT term.
    #[test]
    fn fts_dash_negates(word in "[a-z]{2,12}") {
        prop_assume!(!matches!(word.to_uppercase().as_str(), "AND" | "OR" | "NOT"));
        let translated = convert_websearch_to_fts5(&format!("keep -{word}"));
        prop_assert_eq!(translated, format!("keep AND NOT {word}"));
    }

    /// Relative DSN paths always come back with an explicit ./ prefix.
    #[test]
    fn dsn_relative_paths_prefixed(name in "[a-z][a-z0-9]{0,16}") {
        let parsed = parse_dsn(&format!("sqlite://{name}.db")).expect("parse");
        prop_assert_eq!(parsed, format!("./{name}.db"));
    }

    /// Absolute DSN paths pass through untouched.
    #[test]
    fn dsn_absolute_paths_untouched(name in "[a-z][a-z0-9]{0,16}") {
        let parsed = parse_dsn(&format!("sqlite:///data/{name}.db")).expect("parse");
        prop_assert_eq!(parsed, format!("/data/{name}.db"));
    }
}
