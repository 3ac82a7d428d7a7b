//! Target category vocabulary

/// Label fragments that count as a target
pub const TARGET_LABELS: [&str; 5] = ["bin", "trash", "recycle", "chair", "toilet"];

/// Case-insensitive substring match against [`TARGET_LABELS`]
///
/// Substring, not whole word: "Cabinet" matches through "bin".
pub fn is_target_label(label: &str) -> bool {
    let label = label.to_lowercase();
    TARGET_LABELS.iter().any(|term| label.contains(term))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_targets() {
        assert!(is_target_label("Trash Can"));
        assert!(is_target_label("chair"));
        assert!(is_target_label("TOILET"));
        assert!(is_target_label("recycle bin"));
        assert!(is_target_label("Cabinet"));
        assert!(is_target_label("armchair"));
    }

    #[test]
    fn test_non_targets() {
        assert!(!is_target_label("Dog"));
        assert!(!is_target_label("person"));
        assert!(!is_target_label(""));
        assert!(!is_target_label("b i n"));
    }

    proptest! {
        #[test]
        fn prop_case_insensitive(label in "[a-zA-Z ]{0,24}") {
            prop_assert_eq!(
                is_target_label(&label),
                is_target_label(&label.to_uppercase())
            );
        }

        #[test]
        fn prop_embedded_term_matches(
            prefix in "[a-z]{0,8}",
            suffix in "[a-z]{0,8}",
            idx in 0usize..TARGET_LABELS.len(),
        ) {
            let label = format!("{}{}{}", prefix, TARGET_LABELS[idx].to_uppercase(), suffix);
            prop_assert!(is_target_label(&label));
        }

        #[test]
        fn prop_matches_iff_term_present(label in "[a-z]{0,12}") {
            let expected = TARGET_LABELS.iter().any(|t| label.contains(t));
            prop_assert_eq!(is_target_label(&label), expected);
        }
    }
}
