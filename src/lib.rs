//! cgMLST allele code assignment: places isolate allele profiles into a
//! hierarchical, dotted-integer nomenclature via greedy single-linkage
//! clustering across organism-specific distance thresholds.

pub mod classifier;
pub mod config;
pub mod controller;
pub mod distance;
pub mod engine;
pub mod error;
pub mod input;
pub mod lock;
pub mod logging;
pub mod profile;
pub mod progress;
pub mod scaffold;
pub mod store;
pub mod tree;
pub mod xcodes;

pub use config::{RunConfig, VERSION};
pub use controller::{run, ChangeRecord, RunSummary};
pub use error::{NomenclatureError, Result};
