//! Client location, server catalog and best-server selection

pub mod catalog;
pub mod config_fetcher;
pub mod geo;
pub mod prober;

pub use catalog::{closest, filter_by_ids, ServerCatalog};
pub use config_fetcher::{ClientSettings, ConfigFetcher};
pub use geo::distance;
pub use prober::{pick_best, ProbeOutcome, ServerProber};
