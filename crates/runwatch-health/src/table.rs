//! The shared status table.
//!
//! One mutex guards both the set of watched deployments and the latest
//! snapshot per deployment. Holders only ever copy in or out of it; no
//! I/O happens under the lock, so a hung backend never blocks readers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use runwatch_state::TenantSnapshot;

#[derive(Debug, Default)]
struct TableState {
    watched: BTreeSet<String>,
    statuses: BTreeMap<String, TenantSnapshot>,
}

/// Latest worker statuses per deployment, plus the set to poll.
#[derive(Debug, Clone, Default)]
pub struct StatusTable {
    inner: Arc<Mutex<TableState>>,
}

impl StatusTable {
    /// Create an empty table watching the given deployments.
    pub fn new<I, S>(watched: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = TableState {
            watched: watched.into_iter().map(Into::into).collect(),
            statuses: BTreeMap::new(),
        };
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Copy of the deployments the next iteration will poll.
    pub async fn watched(&self) -> BTreeSet<String> {
        self.inner.lock().await.watched.clone()
    }

    /// Add and remove watched deployments. Applies from the next iteration.
    pub async fn mutate_watch_set<A, R>(&self, add: A, remove: R)
    where
        A: IntoIterator<Item = String>,
        R: IntoIterator<Item = String>,
    {
        let mut state = self.inner.lock().await;
        for name in add {
            state.watched.insert(name);
        }
        for name in remove {
            state.watched.remove(&name);
        }
        debug!(watched = state.watched.len(), "watch set updated");
    }

    /// Latest snapshot for a deployment, or the zero value if none exists.
    pub async fn read_snapshot(&self, deployment: &str) -> TenantSnapshot {
        self.inner
            .lock()
            .await
            .statuses
            .get(deployment)
            .cloned()
            .unwrap_or_default()
    }

    /// Copy of every committed snapshot.
    pub async fn read_all(&self) -> BTreeMap<String, TenantSnapshot> {
        self.inner.lock().await.statuses.clone()
    }

    /// Publish one iteration's results in a single lock acquisition.
    ///
    /// Deployments outside `polled` are dropped from the table. Polled
    /// deployments missing from `results` keep their previous snapshot.
    pub async fn commit(
        &self,
        polled: &BTreeSet<String>,
        results: BTreeMap<String, TenantSnapshot>,
    ) {
        let mut state = self.inner.lock().await;
        state.statuses.retain(|name, _| polled.contains(name));
        let updated = results.len();
        state.statuses.extend(results);
        debug!(
            polled = polled.len(),
            updated,
            "status table committed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runwatch_state::{RunWorkerStatus, WorkerStatus};

    fn snapshot(run_ids: &[&str], status: WorkerStatus) -> TenantSnapshot {
        TenantSnapshot::supported(
            run_ids
                .iter()
                .map(|id| RunWorkerStatus::new(*id, status, None))
                .collect(),
        )
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn unknown_deployment_reads_zero_value() {
        let table = StatusTable::new(["t1"]);
        let snap = table.read_snapshot("nope").await;
        assert_eq!(snap, TenantSnapshot::unsupported());
    }

    #[tokio::test]
    async fn watch_set_mutation() {
        let table = StatusTable::new(["t1", "t2"]);
        table
            .mutate_watch_set(vec!["t3".to_string()], vec!["t1".to_string()])
            .await;
        assert_eq!(table.watched().await, set(&["t2", "t3"]));
    }

    #[tokio::test]
    async fn commit_retains_missing_and_prunes_unpolled() {
        let table = StatusTable::new(["a", "b", "c"]);
        let mut first = BTreeMap::new();
        first.insert("a".to_string(), snapshot(&["r1"], WorkerStatus::Running));
        first.insert("b".to_string(), snapshot(&["r2"], WorkerStatus::Running));
        first.insert("c".to_string(), snapshot(&["r3"], WorkerStatus::Running));
        table.commit(&set(&["a", "b", "c"]), first).await;

        // a's listing failed this cycle; c is no longer watched.
        let mut second = BTreeMap::new();
        second.insert("b".to_string(), snapshot(&["r2"], WorkerStatus::Success));
        table.commit(&set(&["a", "b"]), second).await;

        let all = table.read_all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all["a"], snapshot(&["r1"], WorkerStatus::Running));
        assert_eq!(all["b"], snapshot(&["r2"], WorkerStatus::Success));
        assert!(!all.contains_key("c"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_never_see_partial_commits() {
        let table = StatusTable::new(["t1"]);
        let polled = set(&["t1"]);
        let runs: Vec<String> = (0..50).map(|i| format!("r{i}")).collect();
        let run_refs: Vec<&str> = runs.iter().map(String::as_str).collect();
        table
            .commit(
                &polled,
                BTreeMap::from([("t1".to_string(), snapshot(&run_refs, WorkerStatus::Running))]),
            )
            .await;

        let reader = {
            let table = table.clone();
            tokio::spawn(async move {
                for _ in 0..2_000 {
                    let snap = table.read_snapshot("t1").await;
                    assert_eq!(snap.statuses.len(), 50);
                    let first = snap.statuses[0].status;
                    assert!(snap.statuses.iter().all(|s| s.status == first));
                    tokio::task::yield_now().await;
                }
            })
        };

        for i in 0..500 {
            let status = if i % 2 == 0 {
                WorkerStatus::Success
            } else {
                WorkerStatus::Running
            };
            table
                .commit(
                    &polled,
                    BTreeMap::from([("t1".to_string(), snapshot(&run_refs, status))]),
                )
                .await;
            tokio::task::yield_now().await;
        }

        reader.await.unwrap();
    }
}
