//! Basic cleaning step of the NYC Airbnb pipeline: fetch the raw listings
//! artifact, drop bad rows, publish the cleaned table as a new artifact.

pub mod artifacts;
pub mod cleaner;
pub mod config;
pub mod constants;
pub mod dates;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod run;
pub mod step;
pub mod table;

pub use cleaner::{clean, clean_with_report, CleaningReport, PriceRange, Stage};
pub use config::{StepConfig, TrackingConfig};
pub use error::{ArtifactServiceError, CleaningError, InputError, Result};
pub use step::{go, StepOutcome};
pub use table::{Table, Value};
