use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::agent::AgentRecord;

/// Availability directory for all known agents. Assignment goes through a
/// per-agent compare-and-set, so an agent racing two accepts can win at
/// most one of them.
#[derive(Default)]
pub struct AgentDirectory {
    agents: DashMap<Uuid, AgentRecord>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
        }
    }

    pub fn register(&self, agent: AgentRecord) -> Uuid {
        let id = agent.id;
        self.agents.insert(id, agent);
        id
    }

    pub fn get(&self, agent_id: Uuid) -> Result<AgentRecord, DispatchError> {
        self.agents
            .get(&agent_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DispatchError::NotFound(format!("agent {agent_id} not found")))
    }

    pub fn list(&self) -> Vec<AgentRecord> {
        self.agents.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn online_count(&self) -> usize {
        self.agents.iter().filter(|e| e.value().online).count()
    }

    pub fn set_online(&self, agent_id: Uuid, online: bool) -> Result<AgentRecord, DispatchError> {
        let mut entry = self
            .agents
            .get_mut(&agent_id)
            .ok_or_else(|| DispatchError::NotFound(format!("agent {agent_id} not found")))?;

        let agent = entry.value_mut();
        agent.online = online;
        agent.updated_at = Utc::now();

        Ok(agent.clone())
    }

    /// Compare-and-set `current_job: None -> Some(job_id)`. Exactly one of
    /// any number of concurrent assignment attempts can succeed.
    pub fn assign(&self, agent_id: Uuid, job_id: Uuid) -> Result<(), DispatchError> {
        let mut entry = self
            .agents
            .get_mut(&agent_id)
            .ok_or_else(|| DispatchError::NotFound(format!("agent {agent_id} not found")))?;

        let agent = entry.value_mut();
        if agent.current_job.is_some() {
            return Err(DispatchError::AgentEngaged);
        }

        agent.current_job = Some(job_id);
        agent.updated_at = Utc::now();
        Ok(())
    }

    /// Clears the assignment only if the agent still holds `job_id`; a stale
    /// release for a previous job never clobbers a newer assignment.
    pub fn release(&self, agent_id: Uuid, job_id: Uuid) {
        if let Some(mut entry) = self.agents.get_mut(&agent_id) {
            let agent = entry.value_mut();
            if agent.current_job == Some(job_id) {
                agent.current_job = None;
                agent.updated_at = Utc::now();
            }
        }
    }

}
