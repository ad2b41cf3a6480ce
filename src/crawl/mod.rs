//! The crawl engine: entity model, shared state, scheduling and output
//! flushing.

pub mod dedup;
pub mod estimator;
pub mod flusher;
pub mod frontier;
pub mod model;
pub mod scheduler;
pub mod state;

pub use dedup::Deduplicator;
pub use estimator::{ScopeEstimate, ScopeEstimator};
pub use flusher::{FlushSummary, Flusher, join_flusher};
pub use frontier::Frontier;
pub use model::{Entity, EntityKind, EntityRef};
pub use scheduler::{CrawlOptions, CrawlReport, Crawler};
pub use state::{CrawlState, ProjectLookup};
