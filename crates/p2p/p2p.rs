//! # snapsync-p2p
//!
//! The snap-sync state-healing and range-fetch engine. A pool of *buddy*
//! workers, each bound to one remote peer, cooperatively drives a pivot's
//! account/storage/bytecode ranges to completion and heals the gaps a bulk
//! reply leaves behind, all on a single-threaded event loop.

pub mod config;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod healer;
pub mod inspector;
pub mod peer;
pub mod pivot;
pub mod range_fetch;
pub mod range_set;
pub mod swap_in;
pub mod wire;

pub use config::Config;
pub use engine::{CoveredAccounts, Engine, EngineStorageTries, PivotHandle};
pub use error::EngineError;
pub use pivot::Pivot;
pub use range_set::{NodeTagRange, NodeTagRangeSet};
