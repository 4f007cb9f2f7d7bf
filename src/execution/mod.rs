use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::models::{self, AgentExecution, ExecutionStatus, Map, ASSISTANT_SINGLETON_ID};
use crate::{Result, SpiralError};

struct ExecutionStoreInner {
    executions: HashMap<String, AgentExecution>,
    counter: u64,
}

/// Append-oriented map of agent executions keyed by id, queryable by task.
/// Grounded on spec.md §4.3 and the `Execution` record lifecycle described
/// in `assistant/service.py::execute_agent`.
pub struct ExecutionStore {
    inner: Mutex<ExecutionStoreInner>,
}

impl Default for ExecutionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ExecutionStoreInner {
                executions: HashMap::new(),
                counter: 0,
            }),
        }
    }

    pub async fn create(
        &self,
        agent_id: String,
        task_id: String,
        inputs: Map,
        assistant_id: Option<String>,
    ) -> AgentExecution {
        let mut inner = self.inner.lock().await;
        inner.counter += 1;
        let execution = AgentExecution {
            id: models::ids::next("exec", inner.counter),
            assistant_id: assistant_id.unwrap_or_else(|| ASSISTANT_SINGLETON_ID.to_string()),
            agent_id,
            task_id,
            status: ExecutionStatus::Pending,
            inputs,
            results: None,
            error: None,
            started_at: None,
            completed_at: None,
            created_at: chrono::Utc::now(),
        };
        inner
            .executions
            .insert(execution.id.clone(), execution.clone());
        execution
    }

    pub async fn update(&self, execution: AgentExecution) -> Result<AgentExecution> {
        let mut inner = self.inner.lock().await;
        if !inner.executions.contains_key(&execution.id) {
            return Err(SpiralError::NotFound(format!(
                "execution {} not found",
                execution.id
            )));
        }
        inner
            .executions
            .insert(execution.id.clone(), execution.clone());
        Ok(execution)
    }

    pub async fn get(&self, id: &str) -> Option<AgentExecution> {
        self.inner.lock().await.executions.get(id).cloned()
    }

    pub async fn list_by_task(&self, task_id: &str) -> Vec<AgentExecution> {
        self.inner
            .lock()
            .await
            .executions
            .values()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect()
    }
}
