//! Watermark store
//!
//! Persists one record per league-year plus its activity and snapshot rows.
//! Every mutation of a league-year goes through `commit_atomic`, so the
//! watermark is never visible without the rows it covers.

pub mod memory;
pub mod postgres;
mod traits;
pub mod transaction;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use traits::{ChildRows, WatermarkStore};
pub use transaction::{CommitScope, ManagedTransaction};
