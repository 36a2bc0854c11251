/**
 * CONNECTION MATRIX - Sparse agent×agent map of connection records
 *
 * ROLE: Holds "from agent" -> "to agent" time series and merges fresh, possibly
 * partial fetches into the cached matrix cell by cell.
 *
 * MERGE: a ConnectionUpdatePolicy decides per cell which record survives.
 * SplicePolicy (default) keeps the fresher record and splices older cached history
 * behind it; ReplacePolicy is the reduced variant that replaces wholesale.
 * Neither drops cached data because of an equally fresh or older update.
 *
 * USAGE: matrix.connection(&from, &to).map(|c| c.latest_measurement())
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use tracing::warn;

use super::connection::MeshColumn;
use crate::types::AgentId;

/// Decides which record becomes the cached one for a single agent pair
pub trait ConnectionUpdatePolicy: Send + Sync {
    fn update(&self, cached: Option<MeshColumn>, update: MeshColumn) -> MeshColumn;
}

/// Freshest record wins; strictly fresher updates inherit the older cached history
#[derive(Debug, Clone, Copy, Default)]
pub struct SplicePolicy;

impl ConnectionUpdatePolicy for SplicePolicy {
    fn update(&self, cached: Option<MeshColumn>, mut update: MeshColumn) -> MeshColumn {
        // 1. nothing cached for this pair yet
        let Some(cached) = cached else {
            return update;
        };

        // 2. cached record has no time series
        let Some(cached_latest) = cached.latest_measurement().map(|h| h.timestamp()) else {
            return update;
        };

        // 3. update brings no time series, never regress to nothing
        let Some(update_latest) = update.latest_measurement().map(|h| h.timestamp()) else {
            return cached;
        };

        // 4. update strictly fresher: adopt it, keep cached history older than it
        if update_latest > cached_latest {
            update.extend_history_from(&cached);
            return update;
        }

        // 5. cache newer than what was just fetched
        if update_latest < cached_latest {
            warn!(
                "update for connection to {} is older than cache ({} < {}), keeping cache",
                update.agent_id, update_latest, cached_latest
            );
            return cached;
        }

        // 6. equally fresh, denser sample supersedes
        if update.len() > cached.len() {
            return update;
        }

        // 7.
        cached
    }
}

/// Freshest record wins, replaced wholesale without history splicing
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplacePolicy;

impl ConnectionUpdatePolicy for ReplacePolicy {
    fn update(&self, cached: Option<MeshColumn>, update: MeshColumn) -> MeshColumn {
        let Some(cached) = cached else {
            return update;
        };
        let Some(cached_latest) = cached.latest_measurement().map(|h| h.timestamp()) else {
            return update;
        };
        let Some(update_latest) = update.latest_measurement().map(|h| h.timestamp()) else {
            return cached;
        };

        if cached_latest < update_latest {
            return update;
        }
        if cached_latest == update_latest && update.len() > cached.len() {
            return update;
        }
        cached
    }
}

/// One "from" agent with its outgoing connections, as delivered by a repo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshRow {
    pub agent_id: AgentId,
    pub columns: Vec<MeshColumn>,
}

impl MeshRow {
    pub fn new(agent_id: impl Into<AgentId>, columns: Vec<MeshColumn>) -> Self {
        Self {
            agent_id: agent_id.into(),
            columns,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<MeshRow>", into = "Vec<MeshRow>")]
pub struct ConnectionMatrix {
    connections: BTreeMap<AgentId, BTreeMap<AgentId, MeshColumn>>,
    timestamp_oldest: Option<OffsetDateTime>,
    timestamp_newest: Option<OffsetDateTime>,
}

impl ConnectionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<MeshRow>) -> Self {
        let mut matrix = Self::new();
        for row in rows {
            let cells = matrix.connections.entry(row.agent_id).or_default();
            for column in row.columns {
                cells.insert(column.agent_id.clone(), column);
            }
        }
        matrix.recompute_timestamps();
        matrix
    }

    /// Inserts or overwrites one cell, without merging
    pub fn insert(&mut self, from: impl Into<AgentId>, column: MeshColumn) {
        self.connections
            .entry(from.into())
            .or_default()
            .insert(column.agent_id.clone(), column);
        self.recompute_timestamps();
    }

    pub fn connection(&self, from: &AgentId, to: &AgentId) -> Option<&MeshColumn> {
        self.connections.get(from)?.get(to)
    }

    /// Every physical connection; the from == to diagonal is never yielded
    pub fn connections(&self) -> impl Iterator<Item = (&AgentId, &MeshColumn)> {
        self.connections.iter().flat_map(|(from, cells)| {
            cells
                .values()
                .filter(move |column| column.agent_id != *from)
                .map(move |column| (from, column))
        })
    }

    pub fn from_agents(&self) -> impl Iterator<Item = &AgentId> {
        self.connections.keys()
    }

    pub fn num_connections(&self) -> usize {
        self.connections().count()
    }

    pub fn num_connections_with_data(&self) -> usize {
        self.connections().filter(|(_, c)| c.has_data()).count()
    }

    /// Oldest "latest measurement" across all connections
    pub fn timestamp_oldest(&self) -> Option<OffsetDateTime> {
        self.timestamp_oldest
    }

    /// Newest "latest measurement" across all connections
    pub fn timestamp_newest(&self) -> Option<OffsetDateTime> {
        self.timestamp_newest
    }

    /// Merges every cell present in `src`; cells absent from `src` are left untouched
    pub fn incremental_update(&mut self, src: ConnectionMatrix, policy: &dyn ConnectionUpdatePolicy) {
        for (from, src_cells) in src.connections {
            let cells = self.connections.entry(from).or_default();
            for (to, update) in src_cells {
                let cached = cells.remove(&to);
                cells.insert(to, policy.update(cached, update));
            }
        }
        self.recompute_timestamps();
    }

    /// Drops the cells for which `keep(from, to)` is false, and rows left empty
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&AgentId, &AgentId) -> bool) {
        for (from, cells) in self.connections.iter_mut() {
            cells.retain(|to, _| keep(from, to));
        }
        self.connections.retain(|_, cells| !cells.is_empty());
        self.recompute_timestamps();
    }

    pub(crate) fn for_each_column_mut(&mut self, mut f: impl FnMut(&mut MeshColumn)) {
        for cells in self.connections.values_mut() {
            cells.values_mut().for_each(&mut f);
        }
        self.recompute_timestamps();
    }

    fn recompute_timestamps(&mut self) {
        let latest: Vec<OffsetDateTime> = self
            .connections()
            .filter_map(|(_, c)| c.latest_measurement().map(|h| h.timestamp()))
            .collect();
        self.timestamp_oldest = latest.iter().min().copied();
        self.timestamp_newest = latest.iter().max().copied();
    }
}

impl From<Vec<MeshRow>> for ConnectionMatrix {
    fn from(rows: Vec<MeshRow>) -> Self {
        ConnectionMatrix::from_rows(rows)
    }
}

impl From<ConnectionMatrix> for Vec<MeshRow> {
    fn from(matrix: ConnectionMatrix) -> Self {
        matrix
            .connections
            .into_iter()
            .map(|(agent_id, cells)| MeshRow {
                agent_id,
                columns: cells.into_values().collect(),
            })
            .collect()
    }
}
