//! Agent pipeline editing and configuration history.

use crate::agent::{default_agents, AgentConfig, AgentUpdate};
use crate::error::AgentFlowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Default number of snapshots kept in history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// A named snapshot of the agent pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub agents: Vec<AgentConfig>,
}

/// Direction for [`ConfigurationStore::move_agent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// The agent pipeline plus a capped, most-recent-first snapshot history.
///
/// History lives in memory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationStore {
    agents: Vec<AgentConfig>,
    history: Vec<ProjectConfig>,
    history_capacity: usize,
}

impl Default for ConfigurationStore {
    fn default() -> Self {
        Self {
            agents: default_agents(),
            history: Vec::new(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Agent ids must be unique within a pipeline.
fn ensure_unique_ids(agents: &[AgentConfig]) -> Result<(), AgentFlowError> {
    let mut seen = HashSet::with_capacity(agents.len());
    for agent in agents {
        if !seen.insert(agent.id.as_str()) {
            return Err(duplicate_id(&agent.id));
        }
    }
    Ok(())
}

fn duplicate_id(id: &str) -> AgentFlowError {
    AgentFlowError::InvalidConfig(format!("duplicate agent id '{id}'"))
}

impl ConfigurationStore {
    /// Start from `agents`, rejecting duplicate ids.
    pub fn new(agents: Vec<AgentConfig>) -> Result<Self, AgentFlowError> {
        ensure_unique_ids(&agents)?;
        Ok(Self {
            agents,
            ..Self::default()
        })
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self.history.truncate(self.history_capacity);
        self
    }

    pub fn agents(&self) -> &[AgentConfig] {
        &self.agents
    }

    pub fn agent(&self, id: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Replace the whole pipeline. On duplicate ids the pipeline is left
    /// unchanged.
    pub fn set_agents(&mut self, agents: Vec<AgentConfig>) -> Result<(), AgentFlowError> {
        ensure_unique_ids(&agents)?;
        self.agents = agents;
        Ok(())
    }

    /// Append a fresh agent from the new-agent template; returns its id.
    pub fn add_agent(&mut self) -> String {
        let agent = AgentConfig::new_template();
        let id = agent.id.clone();
        self.agents.push(agent);
        id
    }

    /// Append a caller-built agent. Ids must stay unique.
    pub fn push_agent(&mut self, agent: AgentConfig) -> Result<(), AgentFlowError> {
        if self.agent(&agent.id).is_some() {
            return Err(duplicate_id(&agent.id));
        }
        self.agents.push(agent);
        Ok(())
    }

    pub fn remove_agent(&mut self, id: &str) -> Result<AgentConfig, AgentFlowError> {
        let idx = self.index_of(id)?;
        Ok(self.agents.remove(idx))
    }

    pub fn update_agent(&mut self, id: &str, update: AgentUpdate) -> Result<(), AgentFlowError> {
        let idx = self.index_of(id)?;
        self.agents[idx].apply(update);
        Ok(())
    }

    /// Swap the agent at `index` with its neighbour. No-op at the edges or
    /// for an out-of-range index; returns whether anything moved.
    pub fn move_agent(&mut self, index: usize, direction: Direction) -> bool {
        let target = match direction {
            Direction::Up if index > 0 => index - 1,
            Direction::Down if index + 1 < self.agents.len() => index + 1,
            _ => return false,
        };
        if index >= self.agents.len() {
            return false;
        }
        self.agents.swap(index, target);
        true
    }

    fn index_of(&self, id: &str) -> Result<usize, AgentFlowError> {
        self.agents
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| AgentFlowError::UnknownAgent { id: id.to_string() })
    }

    /// Most recent first.
    pub fn history(&self) -> &[ProjectConfig] {
        &self.history
    }

    /// Snapshot the current pipeline into history, evicting the oldest
    /// snapshot beyond capacity. Returns the new snapshot's id.
    pub fn save_snapshot(&mut self) -> String {
        let now = Utc::now();
        let snapshot = ProjectConfig {
            id: uuid::Uuid::now_v7().to_string(),
            name: format!("Config {}", now.format("%H:%M:%S")),
            created_at: now,
            agents: self.agents.clone(),
        };
        let id = snapshot.id.clone();
        self.history.insert(0, snapshot);
        self.history.truncate(self.history_capacity);
        debug!("Saved configuration snapshot {} ({} in history)", id, self.history.len());
        id
    }

    /// Replace the pipeline with a snapshot's agents.
    pub fn restore(&mut self, snapshot_id: &str) -> Result<(), AgentFlowError> {
        let snapshot = self
            .history
            .iter()
            .find(|s| s.id == snapshot_id)
            .ok_or_else(|| AgentFlowError::UnknownSnapshot {
                id: snapshot_id.to_string(),
            })?;
        self.agents = snapshot.agents.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(store: &ConfigurationStore) -> Vec<String> {
        store.agents().iter().map(|a| a.id.clone()).collect()
    }

    #[test]
    fn history_keeps_ten_most_recent_first() {
        let mut store = ConfigurationStore::default();
        let mut saved = Vec::new();
        for i in 0..12 {
            store.set_agents(vec![AgentConfig {
                id: format!("a{i}"),
                ..AgentConfig::new_template()
            }])
            .unwrap();
            saved.push(store.save_snapshot());
        }
        assert_eq!(store.history().len(), 10);
        let kept: Vec<&str> = store.history().iter().map(|s| s.id.as_str()).collect();
        let expected: Vec<&str> = saved.iter().rev().take(10).map(String::as_str).collect();
        assert_eq!(kept, expected);
        assert_eq!(store.history()[0].agents[0].id, "a11");
        assert_eq!(store.history()[9].agents[0].id, "a2");
    }

    #[test]
    fn snapshot_is_an_owned_copy() {
        let mut store = ConfigurationStore::default();
        let snap = store.save_snapshot();
        store.update_agent("1", AgentUpdate {
            name: Some("Changed".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(store.history()[0].agents[0].name, "Summarizer");

        store.restore(&snap).unwrap();
        assert_eq!(store.agents()[0].name, "Summarizer");
    }

    #[test]
    fn restore_unknown_snapshot_fails() {
        let mut store = ConfigurationStore::default();
        assert!(matches!(
            store.restore("nope"),
            Err(AgentFlowError::UnknownSnapshot { .. })
        ));
    }

    #[test]
    fn move_agent_swaps_and_respects_edges() {
        let mut store = ConfigurationStore::default();
        let third = store.add_agent();
        assert!(!store.move_agent(0, Direction::Up));
        assert!(!store.move_agent(2, Direction::Down));
        assert!(!store.move_agent(7, Direction::Up));
        assert!(store.move_agent(2, Direction::Up));
        assert_eq!(ids(&store), vec!["1".to_string(), third, "2".to_string()]);
    }

    #[test]
    fn add_and_remove_agents() {
        let mut store = ConfigurationStore::default();
        let id = store.add_agent();
        assert_eq!(store.agents().len(), 3);
        assert_eq!(store.agent(&id).unwrap().name, "New Agent");
        let removed = store.remove_agent("1").unwrap();
        assert_eq!(removed.name, "Summarizer");
        assert!(store.remove_agent("1").is_err());
        assert_eq!(store.agents().len(), 2);
    }

    #[test]
    fn push_rejects_duplicate_ids() {
        let mut store = ConfigurationStore::default();
        let dup = AgentConfig {
            id: "2".into(),
            ..AgentConfig::new_template()
        };
        assert!(store.push_agent(dup).is_err());
    }

    fn agent(id: &str, name: &str) -> AgentConfig {
        AgentConfig {
            id: id.into(),
            name: name.into(),
            ..AgentConfig::new_template()
        }
    }

    #[test]
    fn new_rejects_duplicate_ids() {
        let err = ConfigurationStore::new(vec![agent("x", "First"), agent("x", "Other")])
            .unwrap_err();
        assert!(matches!(err, AgentFlowError::InvalidConfig(ref m) if m.contains("'x'")));

        let store = ConfigurationStore::new(vec![agent("x", "First"), agent("y", "Other")])
            .unwrap();
        assert_eq!(ids(&store), vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn set_agents_rejects_duplicates_and_keeps_pipeline() {
        let mut store = ConfigurationStore::default();
        let result = store.set_agents(vec![agent("x", "First"), agent("x", "Other")]);
        assert!(matches!(result, Err(AgentFlowError::InvalidConfig(_))));
        assert_eq!(ids(&store), vec!["1".to_string(), "2".to_string()]);

        store
            .set_agents(vec![agent("x", "First"), agent("y", "Other")])
            .unwrap();
        store
            .update_agent("y", AgentUpdate {
                name: Some("Renamed".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.agent("y").unwrap().name, "Renamed");
        assert_eq!(store.agent("x").unwrap().name, "First");
    }

    #[test]
    fn capacity_is_configurable() {
        let mut store = ConfigurationStore::default().with_history_capacity(2);
        for _ in 0..5 {
            store.save_snapshot();
        }
        assert_eq!(store.history().len(), 2);
    }
}
