use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::models::{self, LogEntry, Map, OperationType, ResourceType};
use crate::Result;

struct LogManagerState {
    counter: u64,
    logs: Vec<LogEntry>,
}

/// Append-only JSONL operation log backed by `logs.jsonl`.
///
/// Grounded on `assistant/workspace/log_manager.py`. `logs` mirrors the file
/// in memory so filtered reads never re-parse the file.
pub struct LogManager {
    path: PathBuf,
    state: Mutex<LogManagerState>,
}

impl LogManager {
    pub async fn new(runtime_path: PathBuf) -> Result<Self> {
        let path = runtime_path.join("logs.jsonl");
        let mut logs = Vec::new();
        if path.exists() {
            let raw = tokio::fs::read_to_string(&path).await?;
            for line in raw.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                if let Ok(entry) = serde_json::from_str::<LogEntry>(line) {
                    logs.push(entry);
                }
            }
        }
        Ok(Self {
            path,
            state: Mutex::new(LogManagerState { counter: 0, logs }),
        })
    }

    pub async fn add(
        &self,
        operation_type: OperationType,
        resource_type: ResourceType,
        resource_id: Option<String>,
        details: Map,
        agent_id: Option<String>,
        task_id: Option<String>,
    ) -> Result<LogEntry> {
        let mut state = self.state.lock().await;
        state.counter += 1;
        let entry = LogEntry {
            id: models::ids::next("log", state.counter),
            timestamp: chrono::Utc::now(),
            operation_type,
            resource_type,
            resource_id,
            details,
            agent_id,
            task_id,
        };

        let line = serde_json::to_string(&entry)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;

        state.logs.push(entry.clone());
        Ok(entry)
    }

    pub async fn get_logs(
        &self,
        operation_type: Option<OperationType>,
        resource_type: Option<ResourceType>,
        agent_id: Option<&str>,
        task_id: Option<&str>,
        limit: Option<usize>,
    ) -> Vec<LogEntry> {
        let state = self.state.lock().await;
        let mut matches: Vec<LogEntry> = state
            .logs
            .iter()
            .rev()
            .filter(|l| operation_type.map_or(true, |t| l.operation_type == t))
            .filter(|l| resource_type.map_or(true, |t| l.resource_type == t))
            .filter(|l| agent_id.map_or(true, |a| l.agent_id.as_deref() == Some(a)))
            .filter(|l| task_id.map_or(true, |t| l.task_id.as_deref() == Some(t)))
            .cloned()
            .collect();
        if let Some(limit) = limit {
            matches.truncate(limit);
        }
        matches
    }

    pub async fn search_logs(&self, query: &str, limit: usize) -> Vec<LogEntry> {
        let needle = query.to_lowercase();
        let state = self.state.lock().await;
        state
            .logs
            .iter()
            .rev()
            .filter(|l| {
                serde_json::to_string(&l.details)
                    .unwrap_or_default()
                    .to_lowercase()
                    .contains(&needle)
            })
            .take(limit)
            .cloned()
            .collect()
    }

    /// Recent logs scoped to an agent/task, for the context an assistant
    /// attaches to an agent's input (spec.md §4.6 step 1).
    pub async fn get_recent_logs(
        &self,
        agent_id: Option<&str>,
        task_id: Option<&str>,
        limit: usize,
    ) -> Vec<LogEntry> {
        self.get_logs(None, None, agent_id, task_id, Some(limit)).await
    }

    pub async fn get_all_logs(&self) -> Vec<LogEntry> {
        self.get_logs(None, None, None, None, None).await
    }

    pub async fn get_log_count(&self) -> usize {
        self.state.lock().await.logs.len()
    }
}
