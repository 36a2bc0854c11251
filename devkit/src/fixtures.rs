/*!
Builders for mesh test data

Agents get IP 10.0.0.N in declaration order and one task each, so connections
towards any agent can be filtered by task like the upstream API does.
*/

use meshwatch_kernel::models::{Agent, Agents, ConnectionMatrix, HealthItem, MeshColumn, MeshResults, Task, Tasks};
use meshwatch_kernel::types::{AgentId, TaskId};
use std::net::{IpAddr, Ipv4Addr};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

/// Fixed reference instant for deterministic series
pub const T0: OffsetDateTime = datetime!(2024-03-01 12:00 UTC);

/// `count` samples towards `to`, newest at `newest`, one every `step`
pub fn series(to: &str, newest: OffsetDateTime, count: usize, step: Duration) -> MeshColumn {
    let items = (0..count)
        .map(|i| {
            let ts = newest - step * i as u32;
            HealthItem::new(ts, 10.0 + i as f64, 1.0, 0.0)
        })
        .collect();
    MeshColumn::new(to, items)
}

pub fn agent_ip(index: usize) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, (index / 250) as u8, (index % 250) as u8 + 1))
}

pub fn task_id(agent: &str) -> TaskId {
    TaskId::new(format!("task-{}", agent))
}

#[derive(Debug, Clone)]
pub struct MeshBuilder {
    agents: Vec<Agent>,
    period_seconds: u32,
    matrix: ConnectionMatrix,
    with_tasks: bool,
}

impl MeshBuilder {
    pub fn new(agent_ids: &[&str]) -> Self {
        let agents = agent_ids
            .iter()
            .enumerate()
            .map(|(i, id)| Agent::new(*id, agent_ip(i), *id, id.to_uppercase()))
            .collect();
        Self {
            agents,
            period_seconds: 60,
            matrix: ConnectionMatrix::new(),
            with_tasks: true,
        }
    }

    pub fn period(mut self, seconds: u32) -> Self {
        self.period_seconds = seconds;
        self
    }

    /// No task configuration, as when the upstream omits it
    pub fn without_tasks(mut self) -> Self {
        self.with_tasks = false;
        self
    }

    pub fn rename(mut self, id: &str, name: &str) -> Self {
        if let Some(agent) = self.agents.iter_mut().find(|a| a.id.as_str() == id) {
            agent.name = name.to_string();
        }
        self
    }

    pub fn column(mut self, from: &str, column: MeshColumn) -> Self {
        self.matrix.insert(from, column);
        self
    }

    /// `count` samples from -> to, newest at `newest`, one per test period
    pub fn connection(self, from: &str, to: &str, newest: OffsetDateTime, count: usize) -> Self {
        let step = Duration::seconds(i64::from(self.period_seconds));
        self.column(from, series(to, newest, count, step))
    }

    /// Every off-diagonal pair with the same series shape
    pub fn full_mesh(mut self, newest: OffsetDateTime, count: usize) -> Self {
        let ids: Vec<String> = self.agents.iter().map(|a| a.id.to_string()).collect();
        for from in &ids {
            for to in &ids {
                if from != to {
                    self = self.connection(from, to, newest, count);
                }
            }
        }
        self
    }

    pub fn build(self) -> MeshResults {
        let tasks: Tasks = if self.with_tasks {
            self.agents
                .iter()
                .map(|a| Task::new(task_id(a.id.as_str()), a.ip, self.period_seconds))
                .collect::<Vec<_>>()
                .into()
        } else {
            Tasks::new()
        };
        let agents: Agents = self.agents.into();
        MeshResults::new(agents, tasks, self.matrix)
    }
}

/// Sample count of one connection, 0 when absent
pub fn samples(mesh: &MeshResults, from: &str, to: &str) -> usize {
    mesh.connection(&AgentId::from(from), &AgentId::from(to))
        .map(|c| c.len())
        .unwrap_or(0)
}

/// MeshResults from its JSON form, for hand-written payloads
pub fn mesh_from_json(value: serde_json::Value) -> anyhow::Result<MeshResults> {
    Ok(serde_json::from_value(value)?)
}
