//! Allele profiles: the flat integer vectors compared by the distance
//! function and stored by the Profile Store.

/// A strain/isolate identifier. Opaque to the rest of the system -- it is
/// whatever string the batch input file puts in its first column.
pub type Key = String;

/// An allele-call vector, one entry per core locus, in the order fixed by
/// the run's core-loci config file. `0` means the locus was not called
/// (missing/absent), matching the original matrix convention.
pub type Profile = Vec<i32>;

/// Fraction of loci in `profile` that are called (non-zero).
pub fn percent_present(profile: &[i32]) -> f64 {
    if profile.is_empty() {
        return 0.0;
    }
    let called = profile.iter().filter(|&&v| v > 0).count();
    called as f64 / profile.len() as f64
}

/// Returns `true` when `profile` clears the `min_present` QC bar.
///
/// The original rounds the fraction to two decimal places before comparing,
/// which matters at the exact threshold boundary -- carried forward as-is.
pub fn passes_core_qc(profile: &[i32], min_present: f64) -> bool {
    let rounded = (percent_present(profile) * 100.0).round() / 100.0;
    rounded >= min_present
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    #[test]
    fn percent_present_counts_nonzero_entries() {
        let p = vec![1, 0, 2, 0, 3];
        assert!(approx_eq!(f64, percent_present(&p), 0.6, epsilon = 1e-9));
    }

    #[test]
    fn percent_present_empty_profile_is_zero() {
        assert_eq!(percent_present(&[]), 0.0);
    }

    #[test]
    fn qc_boundary_rounds_before_comparing() {
        // 59/100 present = 0.59 exactly -> passes a 0.59 cutoff.
        let mut profile = vec![0; 100];
        for v in profile.iter_mut().take(59) {
            *v = 1;
        }
        assert!(passes_core_qc(&profile, 0.59));
        assert!(!passes_core_qc(&profile, 0.6));
    }
}
