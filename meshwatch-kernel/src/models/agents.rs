/**
 * AGENTS REGISTRY - Agents participating in the monitored mesh test
 *
 * ROLE: Identity (AgentId) -> Agent map plus a unique-name index used by the
 * presentation side to sort and look agents up by label.
 *
 * INVARIANT: every name in the name index is unique and points at an agent whose
 * current name is that key. Name collisions get " [id]" appended on both sides.
 */

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, warn};

use crate::types::AgentId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub ip: IpAddr,
    pub name: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub coordinates: Coordinates,
}

impl Agent {
    pub fn new(id: impl Into<AgentId>, ip: IpAddr, name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ip,
            name: name.into(),
            alias: alias.into(),
            coordinates: Coordinates::default(),
        }
    }

    /// Agent known only by id, as seen in mesh rows before the agent list arrives
    pub fn unlisted(id: impl Into<AgentId>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            alias: String::new(),
            coordinates: Coordinates::default(),
        }
    }

    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = coordinates;
        self
    }
}

fn dedup_name(agent: &Agent) -> String {
    format!("{} [{}]", agent.name, agent.id)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Agent>", into = "Vec<Agent>")]
pub struct Agents {
    by_id: HashMap<AgentId, Agent>,
    by_name: BTreeMap<String, AgentId>,
}

impl Agents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_by_id(&self, id: &AgentId) -> Option<&Agent> {
        self.by_id.get(id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Agent> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    /// Inserts or replaces an agent, keeping the name index consistent
    pub fn insert(&mut self, mut agent: Agent) {
        // a re-registered id must not leave its old name behind
        if let Some(previous) = self.by_id.remove(&agent.id) {
            self.by_name.remove(&previous.name);
        }

        if let Some(existing_id) = self.by_name.remove(&agent.name) {
            warn!(
                "duplicate agent name '{}' (ids: {} {})",
                agent.name, existing_id, agent.id
            );
            if let Some(existing) = self.by_id.get_mut(&existing_id) {
                existing.name = dedup_name(existing);
                self.by_name.insert(existing.name.clone(), existing_id);
            }
            agent.name = dedup_name(&agent);
        }

        debug!(
            "adding agent: id: {} name: {} alias: {}",
            agent.id, agent.name, agent.alias
        );
        self.by_name.insert(agent.name.clone(), agent.id.clone());
        self.by_id.insert(agent.id.clone(), agent);
    }

    pub fn remove(&mut self, id: &AgentId) -> Option<Agent> {
        let agent = self.by_id.remove(id)?;
        if self.by_name.get(&agent.name) == Some(id) {
            self.by_name.remove(&agent.name);
        } else {
            warn!("agent id: {} name: {} was not in index by name", agent.id, agent.name);
        }
        Some(agent)
    }

    /// Agents sorted case-insensitively by name
    pub fn all(&self) -> Vec<&Agent> {
        let mut agents: Vec<&Agent> = self.by_id.values().collect();
        agents.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        agents
    }

    pub fn ids(&self) -> impl Iterator<Item = &AgentId> {
        self.by_id.keys()
    }

    /// Same agent set, compared by id only
    pub fn same_agents(&self, other: &Agents) -> bool {
        self.by_id.len() == other.by_id.len()
            && self.by_id.keys().all(|id| other.by_id.contains_key(id))
    }

    /// Refreshes names and aliases from mesh row data while keeping the
    /// attributes only the agent list provides (ip, coordinates)
    pub fn update_names_aliases(&mut self, src: &Agents) {
        for src_agent in src.by_id.values() {
            match self.remove(&src_agent.id) {
                Some(mut agent) => {
                    agent.name = src_agent.name.clone();
                    agent.alias = src_agent.alias.clone();
                    self.insert(agent);
                }
                None => {
                    warn!(
                        "agent {} (name: {}) was not in cache",
                        src_agent.id, src_agent.name
                    );
                    self.insert(src_agent.clone());
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl From<Vec<Agent>> for Agents {
    fn from(list: Vec<Agent>) -> Self {
        let mut agents = Agents::new();
        for agent in list {
            agents.insert(agent);
        }
        agents
    }
}

impl From<Agents> for Vec<Agent> {
    fn from(agents: Agents) -> Self {
        let mut list: Vec<Agent> = agents.by_id.into_values().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }
}
