//! SQLite storage for shard databases
//!
//! Every input file gets a shard database of its own, written by exactly
//! one reader worker through a [`ShardDb`] handle. The same handle type
//! implements the cross-file merge primitive the integrator is built on.
//!
//! ```text
//! ┌──────────────┐   RowBatch    ┌──────────────┐
//! │ Reader worker├──────────────▶│   ShardDb    │──▶ shard-<uuid>.db
//! └──────────────┘  bulk_insert  └──────────────┘
//!
//! ┌──────────────┐    merge      ┌──────────────┐
//! │ Merge worker ├──────────────▶│ ShardDb base │◀── ATTACH other.db
//! └──────────────┘ insert-select └──────────────┘
//! ```

pub mod batch;
pub mod shard;

pub use batch::RowBatch;
pub use shard::ShardDb;
