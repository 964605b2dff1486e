//! runwatch-state: value types and run storage for runwatch.
//!
//! The types here are what the health monitor produces and what readers
//! consume: per-run worker statuses, per-deployment snapshots, and the
//! code-server heartbeat records that travel alongside them.
//!
//! # Architecture
//!
//! `RunStore` is backed by [redb](https://docs.rs/redb). Run records are
//! JSON-serialized into `&[u8]` value columns under `{deployment}:{run_id}`
//! keys, so a deployment's runs are one contiguous range scan.
//!
//! The store is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`) and
//! can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::RunStore;
pub use types::*;
