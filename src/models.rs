use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod ids {
    use rand::Rng;

    /// Builds an id in the source's `{prefix}_{counter}_{rand8hex}` shape.
    /// `counter` must already be the post-increment value the caller holds
    /// its lock across; this function has no side effects of its own.
    pub fn next(prefix: &str, counter: u64) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..8)
            .map(|_| {
                let v: u8 = rng.gen_range(0..16);
                std::char::from_digit(v as u32, 16).unwrap()
            })
            .collect();
        format!("{prefix}_{counter}_{suffix}")
    }
}

pub type Map = HashMap<String, serde_json::Value>;

// ---------------------------------------------------------------------
// Task Stack
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: Map,
    pub status: TaskStatus,
    pub progress: Map,
    pub results: Option<Map>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Task {
    pub fn new(id: String, description: Map) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            description,
            status: TaskStatus::Pending,
            progress: Map::new(),
            results: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One entry in a `TaskLayer`'s ordered task list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerTaskEntry {
    pub task_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLayer {
    pub layer_index: usize,
    pub tasks: Vec<LayerTaskEntry>,
    pub pre_hook: Option<String>,
    pub post_hook: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TaskLayer {
    pub fn new(layer_index: usize, pre_hook: Option<String>, post_hook: Option<String>) -> Self {
        Self {
            layer_index,
            tasks: Vec::new(),
            pre_hook,
            post_hook,
            created_at: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ExecutionPointer {
    pub layer_index: usize,
    pub task_index: usize,
    pub in_pre_hook: bool,
    pub in_post_hook: bool,
}

impl ExecutionPointer {
    /// Lexicographic frontier comparison per spec: `(layer, task) < (pointer.layer, pointer.task)`.
    pub fn is_executed(&self, layer_index: usize, task_index: usize) -> bool {
        (layer_index, task_index) < (self.layer_index, self.task_index)
    }
}

/// Returned by `get_next_task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextTask {
    pub layer_index: usize,
    pub task_index: usize,
    pub task_id: String,
    pub layer: TaskLayer,
    pub is_pre_hook: bool,
}

// ---------------------------------------------------------------------
// Batch operations
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchOperation {
    CreateTasks {
        tasks: Vec<CreateTaskSpec>,
    },
    CreateLayers {
        layers: Vec<CreateLayerSpec>,
    },
    AddTasksToLayers {
        additions: Vec<AddTaskSpec>,
    },
    RemoveTasksFromLayers {
        removals: Vec<RemoveTaskSpec>,
    },
    ReplaceTasksInLayers {
        replacements: Vec<ReplaceTaskSpec>,
    },
    UpdateLayerHooks {
        updates: Vec<UpdateHooksSpec>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskSpec {
    pub description: Map,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLayerSpec {
    pub layer_index: Option<usize>,
    pub pre_hook: Option<String>,
    pub post_hook: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTaskSpec {
    pub layer_index: usize,
    pub task_id: String,
    pub insert_index: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveTaskSpec {
    pub layer_index: usize,
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceTaskSpec {
    pub layer_index: usize,
    pub old_id: String,
    pub new_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateHooksSpec {
    pub layer_index: usize,
    pub pre_hook: Option<String>,
    pub post_hook: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BatchResult {
    pub success: bool,
    pub results: Vec<serde_json::Value>,
    pub errors: Vec<String>,
    pub created_task_ids: Vec<String>,
    pub created_layer_indices: Vec<usize>,
}

// ---------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderType {
    User,
    Director,
    Subagent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadStatus {
    Unread,
    Read,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessage {
    pub id: String,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub sender_type: SenderType,
    pub director_read_status: ReadStatus,
    pub user_read_status: ReadStatus,
    pub task_id: Option<String>,
}

// ---------------------------------------------------------------------
// Assistant / Execution
// ---------------------------------------------------------------------

pub const ASSISTANT_SINGLETON_ID: &str = "assistant_global";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assistant {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Default for Assistant {
    fn default() -> Self {
        Self {
            id: ASSISTANT_SINGLETON_ID.to_string(),
            name: "Assistant".to_string(),
            description: "Dispatches sub-agents against the task stack.".to_string(),
            created_at: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecution {
    pub id: String,
    pub assistant_id: String,
    pub agent_id: String,
    pub task_id: String,
    pub status: ExecutionStatus,
    pub inputs: Map,
    pub results: Option<Map>,
    pub error: Option<String>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// ---------------------------------------------------------------------
// Workspace: files, memory, logs
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
    Text,
    Audio,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    pub filename: String,
    pub description: String,
    pub file_type: FileType,
    pub extension: String,
    pub file_path: String,
    pub size_bytes: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub created_by: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Map,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Read,
    Write,
    Delete,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    File,
    Memory,
    Log,
    Workspace,
    Execution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub operation_type: OperationType,
    pub resource_type: ResourceType,
    pub resource_id: Option<String>,
    pub details: Map,
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryWriteResult {
    pub success: bool,
    pub was_truncated: bool,
    pub original_length: usize,
    pub final_length: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub length: usize,
    pub max_length: usize,
    pub is_full: bool,
}

// ---------------------------------------------------------------------
// Assistant pipeline config (supplemented from original_source)
// ---------------------------------------------------------------------

/// Caller-supplied overrides merged over per-descriptor defaults before
/// `build_input` runs. Grounded on `service.py::_new_pipeline_config`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    pub target_total_duration_sec: Option<f64>,
    pub language: Option<String>,
}

impl PipelineConfig {
    pub fn merged_over(mut self, overrides: &PipelineConfig) -> Self {
        if overrides.target_total_duration_sec.is_some() {
            self.target_total_duration_sec = overrides.target_total_duration_sec;
        }
        if overrides.language.is_some() {
            self.language = overrides.language.clone();
        }
        self
    }
}
