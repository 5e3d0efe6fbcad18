//! The Change Classifier (spec.md §4.5): compares a key's previous and
//! current rendered Allele Code and labels what kind of change happened,
//! if any.

/// A rendered code as seen by the classifier: its digit list (after the
/// `<PREFIX><VERSION> - ` header has been stripped), whether it is
/// full-length, and whether it currently matches an excluded ("Xcode")
/// prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedCode {
    pub digits: Vec<i64>,
    pub complete: bool,
    pub xcoded: bool,
}

/// What kind of transition a key's code underwent between two runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeType {
    /// The key had no code before this run.
    New,
    /// The rendered code is unchanged.
    NoChange,
    /// The key's excluded-code status flipped (entered or left an Xcode).
    Xcoded,
    /// The new code is the old code with more digits appended -- more
    /// resolution was needed, but nothing the key was already part of was
    /// reassigned.
    Extended,
    /// The code changed at digit `at` (0-indexed) because of a cluster
    /// merge or split.
    Merged { at: usize },
    /// Any other transition, most commonly a code shortening caused by a
    /// reference profile disappearing from the tree.
    Other,
}

/// The literal change-log label for `change`, matching the original's
/// on-disk change-log strings exactly (`"X"`, not the Rust variant name
/// `Xcoded`).
pub fn change_type_label(change: &ChangeType) -> String {
    match change {
        ChangeType::New => "New".to_string(),
        ChangeType::NoChange => "NoChange".to_string(),
        ChangeType::Xcoded => "X".to_string(),
        ChangeType::Extended => "Extended".to_string(),
        ChangeType::Merged { at } => format!("Merged@{at}"),
        ChangeType::Other => "Other".to_string(),
    }
}

/// Classifies the transition from `old` (the code observed at the start of
/// this run, or `None` for a brand-new key) to `new` (the code just
/// rendered).
pub fn classify(old: Option<&RenderedCode>, new: &RenderedCode) -> ChangeType {
    let Some(old) = old else {
        return ChangeType::New;
    };

    let compare_len = new.digits.len();
    let old_truncated: Vec<i64> = old.digits.iter().take(compare_len).copied().collect();
    let unchanged = old_truncated == new.digits && old.xcoded == new.xcoded;
    if unchanged {
        return ChangeType::NoChange;
    }

    if old.xcoded || new.xcoded {
        return ChangeType::Xcoded;
    }

    if new.digits.len() > old.digits.len() {
        if new.digits[..old.digits.len()] == old.digits[..] {
            return ChangeType::Extended;
        }
        let at = old
            .digits
            .iter()
            .zip(new.digits.iter())
            .position(|(a, b)| a != b)
            .unwrap_or(old.digits.len());
        return ChangeType::Merged { at };
    }

    let min_len = old.digits.len().min(new.digits.len());
    match (0..min_len).find(|&i| old.digits[i] != new.digits[i]) {
        Some(at) => ChangeType::Merged { at },
        None => ChangeType::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(digits: &[i64], complete: bool) -> RenderedCode {
        RenderedCode { digits: digits.to_vec(), complete, xcoded: false }
    }

    #[test]
    fn brand_new_key_is_new() {
        assert_eq!(classify(None, &code(&[1, 1], true)), ChangeType::New);
    }

    #[test]
    fn identical_codes_are_no_change() {
        let c = code(&[1, 2], true);
        assert_eq!(classify(Some(&c.clone()), &c), ChangeType::NoChange);
    }

    #[test]
    fn appending_digits_without_reassignment_is_extended() {
        let old = code(&[1], false);
        let new = code(&[1, 3], true);
        assert_eq!(classify(Some(&old), &new), ChangeType::Extended);
    }

    #[test]
    fn differing_leading_digit_is_merged_at_that_index() {
        let old = code(&[1, 2], true);
        let new = code(&[3, 2], true);
        assert_eq!(classify(Some(&old), &new), ChangeType::Merged { at: 0 });
    }

    #[test]
    fn shortening_with_no_digit_change_is_other() {
        let old = code(&[1, 2], true);
        let new = code(&[1], false);
        assert_eq!(classify(Some(&old), &new), ChangeType::Other);
    }

    #[test]
    fn entering_xcode_status_is_xcoded_even_if_digits_match() {
        let old = code(&[1, 2], true);
        let mut new = code(&[1, 2], true);
        new.xcoded = true;
        assert_eq!(classify(Some(&old), &new), ChangeType::Xcoded);
    }

    #[test]
    fn xcoded_label_is_bare_x_not_the_variant_name() {
        assert_eq!(change_type_label(&ChangeType::Xcoded), "X");
        assert_eq!(change_type_label(&ChangeType::Merged { at: 2 }), "Merged@2");
    }
}
