pub mod browser;
pub mod core;
pub mod engine;
pub mod errors;
pub mod profile;
pub mod runner;
pub mod seeds;
pub mod store;
pub mod testing;
pub mod types;

pub use crate::core::{Config, PageDriver, Query};
pub use engine::{ExtractionAccumulator, Interactor, Locator, StateClassifier, Target};
pub use errors::{Result, ScrapeError};
pub use types::*;
