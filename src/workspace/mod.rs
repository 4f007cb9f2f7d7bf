pub mod file_manager;
pub mod log_manager;
pub mod memory_manager;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::models::{FileMetadata, FileType, Map, MemoryInfo, OperationType, ResourceType};
use crate::Result;

pub use file_manager::FileManager;
pub use log_manager::LogManager;
pub use memory_manager::MemoryManager;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSummary {
    pub workspace_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub file_count: usize,
    pub memory_info: MemoryInfo,
    pub log_count: usize,
    pub runtime_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySearchResult {
    pub found: bool,
    pub length: usize,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSearchResult {
    pub files: Vec<FileMetadata>,
    pub memory: Option<MemorySearchResult>,
    pub logs: Vec<crate::models::LogEntry>,
}

/// Composes the file/memory/log managers for one process-wide workspace.
/// Every mutation through this struct also appends an audit log entry, per
/// `assistant/workspace/workspace.py`.
pub struct Workspace {
    pub workspace_id: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: RwLock<chrono::DateTime<chrono::Utc>>,
    runtime_path: PathBuf,
    pub files: FileManager,
    pub memory: MemoryManager,
    pub logs: LogManager,
}

impl Workspace {
    pub async fn new(workspace_id: impl Into<String>, runtime_base_path: &str) -> Result<Self> {
        let workspace_id = workspace_id.into();
        let runtime_path = PathBuf::from(runtime_base_path).join(&workspace_id);
        tokio::fs::create_dir_all(&runtime_path).await?;

        let files = FileManager::new(runtime_path.clone()).await?;
        let memory = MemoryManager::new(runtime_path.clone()).await?;
        let logs = LogManager::new(runtime_path.clone()).await?;
        let now = chrono::Utc::now();

        Ok(Self {
            workspace_id,
            created_at: now,
            updated_at: RwLock::new(now),
            runtime_path,
            files,
            memory,
            logs,
        })
    }

    async fn touch(&self) {
        *self.updated_at.write().await = chrono::Utc::now();
    }

    pub async fn store_file(
        &self,
        data: &[u8],
        filename: &str,
        description: &str,
        created_by: Option<String>,
        tags: Vec<String>,
        metadata: Map,
    ) -> Result<FileMetadata> {
        let record = self
            .files
            .store_file(data, filename, description, created_by.clone(), tags, metadata)
            .await?;
        self.logs
            .add(
                OperationType::Create,
                ResourceType::File,
                Some(record.id.clone()),
                Map::new(),
                created_by,
                None,
            )
            .await?;
        self.touch().await;
        Ok(record)
    }

    pub async fn delete_file(&self, id: &str) -> Result<bool> {
        let deleted = self.files.delete_file(id).await?;
        if deleted {
            self.logs
                .add(
                    OperationType::Delete,
                    ResourceType::File,
                    Some(id.to_string()),
                    Map::new(),
                    None,
                    None,
                )
                .await?;
            self.touch().await;
        }
        Ok(deleted)
    }

    pub async fn write_memory(&self, content: &str, append: bool) -> Result<crate::models::MemoryWriteResult> {
        let result = self.memory.write(content, append).await?;
        self.logs
            .add(
                OperationType::Write,
                ResourceType::Memory,
                None,
                Map::new(),
                None,
                None,
            )
            .await?;
        self.touch().await;
        Ok(result)
    }

    pub async fn search_all(
        &self,
        query: &str,
        search_files: bool,
        search_memory: bool,
        search_logs: bool,
        limit: usize,
    ) -> WorkspaceSearchResult {
        let files = if search_files {
            self.files.search_files(query, None, limit).await
        } else {
            Vec::new()
        };

        let memory = if search_memory {
            let content = self.memory.read().await;
            let found = content.to_lowercase().contains(&query.to_lowercase());
            let preview: String = content.chars().take(500).collect();
            let preview = if content.chars().count() > 500 {
                format!("{preview}...")
            } else {
                preview
            };
            Some(MemorySearchResult {
                found,
                length: content.chars().count(),
                preview,
            })
        } else {
            None
        };

        let logs = if search_logs {
            self.logs.search_logs(query, limit).await
        } else {
            Vec::new()
        };

        WorkspaceSearchResult {
            files,
            memory,
            logs,
        }
    }

    pub async fn get_summary(&self) -> Result<WorkspaceSummary> {
        Ok(WorkspaceSummary {
            workspace_id: self.workspace_id.clone(),
            created_at: self.created_at,
            updated_at: *self.updated_at.read().await,
            file_count: self.files.get_file_count().await,
            memory_info: self.memory.get_memory_info().await,
            log_count: self.logs.get_log_count().await,
            runtime_path: self.runtime_path.to_string_lossy().to_string(),
        })
    }
}
