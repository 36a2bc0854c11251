use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

use crate::types::TaskId;

/// Periodic test task measuring connections towards one target IP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub target_ip: IpAddr,
    pub period_seconds: u32,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, target_ip: IpAddr, period_seconds: u32) -> Self {
        Self {
            id: id.into(),
            target_ip,
            period_seconds,
        }
    }
}

/// Target IP -> Task. Grows by union only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Task>", into = "Vec<Task>")]
pub struct Tasks {
    by_ip: HashMap<IpAddr, Task>,
}

impl Tasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, task: Task) {
        self.by_ip.insert(task.target_ip, task);
    }

    pub fn get_by_ip(&self, ip: &IpAddr) -> Option<&Task> {
        self.by_ip.get(ip)
    }

    /// Set union; incoming definitions win on IP collision
    pub fn union(&mut self, src: &Tasks) {
        for task in src.by_ip.values() {
            self.by_ip.insert(task.target_ip, task.clone());
        }
    }

    /// Slowest task period, i.e. the longest wait until every connection has a sample
    pub fn max_period_seconds(&self) -> Option<u32> {
        self.by_ip
            .values()
            .map(|t| t.period_seconds)
            .filter(|p| *p > 0)
            .max()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.by_ip.values()
    }

    pub fn len(&self) -> usize {
        self.by_ip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ip.is_empty()
    }
}

impl From<Vec<Task>> for Tasks {
    fn from(list: Vec<Task>) -> Self {
        let mut tasks = Tasks::new();
        for task in list {
            tasks.insert(task);
        }
        tasks
    }
}

impl From<Tasks> for Vec<Task> {
    fn from(tasks: Tasks) -> Self {
        let mut list: Vec<Task> = tasks.by_ip.into_values().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }
}
