/**
 * LOCAL FILE REPO - Mesh results replayed from a JSON snapshot
 *
 * ROLE: Offline Repo implementation. Loads a MeshResults snapshot written by
 * `LocalFileRepo::store` and answers queries by filtering it the way the upstream
 * API filters: by source agent, by target task, by history window measured back
 * from the snapshot's newest sample, and latest-sample-only without timeseries.
 */

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::{MeshResultsQuery, Repo, RepoError};
use crate::models::{MeshConfig, MeshResults};
use crate::types::{AgentId, TestId};

pub struct LocalFileRepo {
    path: PathBuf,
    snapshot: Mutex<MeshResults>,
}

impl LocalFileRepo {
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, RepoError> {
        let path = path.into();
        let snapshot = Self::load(&path)?;
        debug!(
            "loaded snapshot {:?} ({} agents, {} connections with data)",
            path,
            snapshot.agents.len(),
            snapshot.num_connections_with_data()
        );
        Ok(Self {
            path,
            snapshot: Mutex::new(snapshot),
        })
    }

    /// Re-reads the snapshot file; the previous snapshot stays on error
    pub fn reload(&self) -> Result<(), RepoError> {
        let snapshot = Self::load(&self.path)?;
        *self.snapshot.lock() = snapshot;
        Ok(())
    }

    pub fn store<P: AsRef<Path>>(path: P, results: &MeshResults) -> Result<(), RepoError> {
        let json = serde_json::to_string_pretty(results)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<MeshResults, RepoError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn apply_query(mut results: MeshResults, query: &MeshResultsQuery) -> MeshResults {
        if !query.agent_ids.is_empty() {
            let sources: HashSet<&AgentId> = query.agent_ids.iter().collect();
            results.connection_matrix.retain(|from, _| sources.contains(from));
        }

        if !query.task_ids.is_empty() {
            let targets: HashSet<AgentId> = results
                .agents
                .all()
                .into_iter()
                .filter(|agent| {
                    results
                        .tasks
                        .get_by_ip(&agent.ip)
                        .is_some_and(|task| query.task_ids.contains(&task.id))
                })
                .map(|agent| agent.id.clone())
                .collect();
            results.connection_matrix.retain(|_, to| targets.contains(to));
        }

        if let Some(newest) = results.timestamp_newest() {
            let since = newest - Duration::seconds(i64::from(query.history_length_seconds));
            results
                .connection_matrix
                .for_each_column_mut(|column| column.retain_since(since));
        }

        if !query.timeseries {
            results
                .connection_matrix
                .for_each_column_mut(|column| column.truncate_to_latest());
        }

        results.utc_timestamp = OffsetDateTime::now_utc();
        results
    }
}

impl Repo for LocalFileRepo {
    fn get_mesh_config(&self, _test_id: &TestId) -> Result<MeshConfig, RepoError> {
        Ok(self.snapshot.lock().config())
    }

    fn get_mesh_test_results(&self, query: &MeshResultsQuery) -> Result<MeshResults, RepoError> {
        let snapshot = self.snapshot.lock().clone();
        Ok(Self::apply_query(snapshot, query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Agent, ConnectionMatrix, HealthItem, MeshColumn, MeshRow, Task, Tasks};
    use crate::types::TaskId;
    use std::net::{IpAddr, Ipv4Addr};
    use tempfile::tempdir;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2024-03-01 12:00 UTC);

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 1, 0, last))
    }

    fn series(to: &str, samples: i64) -> MeshColumn {
        let items = (0..samples)
            .map(|i| HealthItem::new(T0 - Duration::minutes(i), 5.0, 0.5, 0.0))
            .collect();
        MeshColumn::new(to, items)
    }

    fn snapshot() -> MeshResults {
        let agents = vec![
            Agent::new("a", ip(1), "alpha", "A"),
            Agent::new("b", ip(2), "beta", "B"),
            Agent::new("c", ip(3), "gamma", "C"),
        ]
        .into();
        let tasks: Tasks = vec![
            Task::new("ta", ip(1), 60),
            Task::new("tb", ip(2), 60),
            Task::new("tc", ip(3), 60),
        ]
        .into();
        let matrix = ConnectionMatrix::from_rows(vec![
            MeshRow::new("a", vec![series("b", 10), series("c", 10)]),
            MeshRow::new("b", vec![series("a", 10), series("c", 10)]),
        ]);
        MeshResults::new(agents, tasks, matrix)
    }

    fn stored_repo() -> (tempfile::TempDir, LocalFileRepo) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mesh.json");
        LocalFileRepo::store(&path, &snapshot()).unwrap();
        let repo = LocalFileRepo::open(&path).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_unfiltered_query_returns_whole_window() {
        let (_dir, repo) = stored_repo();
        let query = MeshResultsQuery::all(TestId::from("1"), 3600, true);

        let results = repo.get_mesh_test_results(&query).unwrap();

        assert_eq!(results.num_connections_with_data(), 4);
        let ab = results.connection(&AgentId::from("a"), &AgentId::from("b")).unwrap();
        assert_eq!(ab.len(), 10);
    }

    #[test]
    fn test_agent_and_task_filters() {
        let (_dir, repo) = stored_repo();
        let query = MeshResultsQuery::all(TestId::from("1"), 3600, true)
            .with_agents(vec![AgentId::from("a")])
            .with_tasks(vec![TaskId::from("tc")]);

        let results = repo.get_mesh_test_results(&query).unwrap();

        assert_eq!(results.num_connections_with_data(), 1);
        assert!(results.connection(&AgentId::from("a"), &AgentId::from("c")).is_some());
        assert_eq!(results.agents.len(), 3);
    }

    #[test]
    fn test_history_window_and_latest_only() {
        let (_dir, repo) = stored_repo();

        let short = repo
            .get_mesh_test_results(&MeshResultsQuery::all(TestId::from("1"), 120, true))
            .unwrap();
        let ab = short.connection(&AgentId::from("a"), &AgentId::from("b")).unwrap();
        assert_eq!(ab.len(), 3);

        let latest = repo
            .get_mesh_test_results(&MeshResultsQuery::all(TestId::from("1"), 3600, false))
            .unwrap();
        let ab = latest.connection(&AgentId::from("a"), &AgentId::from("b")).unwrap();
        assert_eq!(ab.len(), 1);
        assert_eq!(ab.latest_measurement().unwrap().timestamp(), T0);
    }

    #[test]
    fn test_config_from_snapshot() {
        let (_dir, repo) = stored_repo();
        let config = repo.get_mesh_config(&TestId::from("1")).unwrap();
        assert_eq!(config.agents.len(), 3);
        assert_eq!(config.update_period_seconds, 60);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = LocalFileRepo::open(dir.path().join("absent.json")).err().unwrap();
        assert!(matches!(err, RepoError::Io(_)));
    }

    #[test]
    fn test_invalid_file_is_serialization_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = LocalFileRepo::open(&path).err().unwrap();
        assert!(matches!(err, RepoError::Serialization(_)));
    }

    #[test]
    fn test_reload_picks_up_new_snapshot_and_survives_bad_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mesh.json");
        LocalFileRepo::store(&path, &snapshot()).unwrap();
        let repo = LocalFileRepo::open(&path).unwrap();

        let mut smaller = snapshot();
        smaller.agents.remove(&AgentId::from("c"));
        LocalFileRepo::store(&path, &smaller).unwrap();
        repo.reload().unwrap();
        assert_eq!(repo.get_mesh_config(&TestId::from("1")).unwrap().agents.len(), 2);

        fs::write(&path, "[]").unwrap();
        assert!(matches!(repo.reload(), Err(RepoError::Serialization(_))));
        assert_eq!(repo.get_mesh_config(&TestId::from("1")).unwrap().agents.len(), 2);
    }
}
