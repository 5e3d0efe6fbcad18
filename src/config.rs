//! Run-scoped configuration.
//!
//! Everything the original kept as module-level globals (`prefix`,
//! `version`, `coreLoci`, `minpres`, `nosave`, `verbose`) lives here as an
//! explicit struct built once in `main` and threaded through every
//! component instead.

use std::path::PathBuf;

use clap::ValueEnum;

/// Algorithm version embedded in every emitted Allele Code.
pub const VERSION: &str = "2.1";

/// Organism prefix, selecting both the abbreviation prepended to codes and
/// the distance threshold table to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Organism {
    #[value(name = "CAMP")]
    Campylobacter,
    #[value(name = "EC")]
    Ecoli,
    #[value(name = "LMO")]
    Listeria,
    #[value(name = "SALM")]
    Salmonella,
}

impl Organism {
    /// The short abbreviation prepended to Allele Codes and data directory
    /// names (e.g. `CAMP`, `EC`).
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Organism::Campylobacter => "CAMP",
            Organism::Ecoli => "EC",
            Organism::Listeria => "LMO",
            Organism::Salmonella => "SALM",
        }
    }

    /// Descending list of distance thresholds (percent mismatch), one per
    /// clustering level. Values are organism-specific, weighted to a fixed
    /// mismatch count over the scheme's total core locus count.
    pub fn thresholds(&self) -> Vec<f64> {
        match self {
            Organism::Campylobacter => scale(&[84, 61, 24, 14, 5, 1], 1343),
            Organism::Listeria => scale(&[71, 51, 36, 19, 7, 1], 1748),
            Organism::Salmonella => scale(&[80, 28, 15, 7, 4, 1], 3002),
            Organism::Ecoli => scale(&[77, 51, 16, 6, 1], 2513),
        }
    }
}

fn scale(mismatches: &[u32], total_loci: u32) -> Vec<f64> {
    mismatches
        .iter()
        .map(|&n| 100.0 * f64::from(n) / f64::from(total_loci))
        .collect()
}

/// Minimum fraction of core loci that must be called for a profile to pass
/// QC. Not organism-specific in the original; kept as a single constant
/// with a CLI override point reserved for future use.
pub const DEFAULT_MIN_PRESENT: f64 = 0.95;

/// Explicit, immutable configuration for a single run. Constructed once in
/// `main` from parsed CLI arguments and passed by reference to every
/// component that needs it.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Organism prefix selecting the threshold table and code abbreviation.
    pub organism: Organism,
    /// Core locus names, in the fixed column order used for every profile.
    pub core_loci: Vec<String>,
    /// Descending distance thresholds, one per nomenclature level.
    pub thresholds: Vec<f64>,
    /// Minimum fraction of core loci that must be called to pass QC.
    pub min_present: f64,
    /// Root of the data directory (`<data_dir>/<prefix>_nomenclature_srcfiles/...`).
    pub data_dir: PathBuf,
    /// Root of the log directory (`<log_dir>/<prefix>_nomenclature_logs/...`).
    pub log_dir: PathBuf,
    /// When set, compute but never persist tree/profile-store changes.
    pub nosave: bool,
    /// When set, mirror log output to stdout.
    pub verbose: bool,
}

impl RunConfig {
    /// Total number of nomenclature levels (the Allele Code's digit count).
    pub fn depth(&self) -> usize {
        self.thresholds.len()
    }

    /// The `<prefix>_nomenclature_srcfiles` directory under `data_dir`.
    pub fn srcfiles_dir(&self) -> PathBuf {
        self.data_dir
            .join(format!("{}_nomenclature_srcfiles", self.organism.abbreviation()))
    }

    /// The `<prefix>_nomenclature_logs` directory under `log_dir`.
    pub fn logs_dir(&self) -> PathBuf {
        self.log_dir
            .join(format!("{}_nomenclature_logs", self.organism.abbreviation()))
    }

    /// Formats a dotted-integer code list with the `<PREFIX><VERSION> - `
    /// header, matching `Tree.CDCName` in the original.
    pub fn render_code(&self, digits: &[i64]) -> String {
        let joined = digits
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(".");
        format!("{}{} - {}", self.organism.abbreviation(), VERSION, joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    #[test]
    fn campylobacter_thresholds_match_known_values() {
        let t = Organism::Campylobacter.thresholds();
        assert!(approx_eq!(f64, t[0], 100.0 * 84.0 / 1343.0, epsilon = 1e-9));
        assert_eq!(t.len(), 6);
    }

    #[test]
    fn render_code_uses_prefix_version_header() {
        let cfg = RunConfig {
            organism: Organism::Salmonella,
            core_loci: vec![],
            thresholds: Organism::Salmonella.thresholds(),
            min_present: DEFAULT_MIN_PRESENT,
            data_dir: PathBuf::from("/tmp/data"),
            log_dir: PathBuf::from("/tmp/data"),
            nosave: false,
            verbose: false,
        };
        assert_eq!(cfg.render_code(&[3, 1, 2]), "SALM2.1 - 3.1.2");
    }
}
