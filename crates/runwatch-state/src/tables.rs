//! redb table definitions for the run store.

use redb::TableDefinition;

/// Run records keyed by `{deployment}:{run_id}`.
pub const RUNS: TableDefinition<&str, &[u8]> = TableDefinition::new("runs");
