use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::models::{self, FileMetadata, FileType, Map};
use crate::{Result, SpiralError};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "webm", "mkv"];
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "json", "yaml", "yml", "csv", "html", "xml"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "m4a"];

fn determine_file_type(extension: &str) -> FileType {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        FileType::Image
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        FileType::Video
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        FileType::Audio
    } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        FileType::Text
    } else {
        FileType::Other
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetadataIndex {
    counter: u64,
    files: HashMap<String, FileMetadata>,
}

struct FileManagerState {
    counter: u64,
    files: HashMap<String, FileMetadata>,
}

/// Numbered, typed, tagged file store backed by `Runtime/{workspace_id}/`.
///
/// Grounded on `assistant/workspace/file_manager.py`: numbering is strictly
/// monotonic and independent of deletions, and the metadata index is
/// rewritten wholesale after every mutation rather than appended.
pub struct FileManager {
    runtime_path: PathBuf,
    state: Mutex<FileManagerState>,
}

impl FileManager {
    const METADATA_FILENAME: &'static str = ".file_metadata.json";

    pub async fn new(runtime_path: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&runtime_path).await?;
        let index_path = runtime_path.join(Self::METADATA_FILENAME);
        let index = if index_path.exists() {
            let raw = tokio::fs::read_to_string(&index_path).await?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            MetadataIndex::default()
        };

        Ok(Self {
            runtime_path,
            state: Mutex::new(FileManagerState {
                counter: index.counter,
                files: index.files,
            }),
        })
    }

    async fn persist_index(&self, state: &FileManagerState) -> Result<()> {
        let index = MetadataIndex {
            counter: state.counter,
            files: state.files.clone(),
        };
        let raw = serde_json::to_string_pretty(&index)?;
        let path = self.runtime_path.join(Self::METADATA_FILENAME);
        tokio::fs::write(path, raw).await?;
        Ok(())
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
        let extension = Path::new(filename)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut state = self.state.lock().await;
        state.counter += 1;
        let counter = state.counter;
        let id = models::ids::next("file", counter);
        let numbered_filename = format!("file_{counter:06}{extension}");
        let file_path = self.runtime_path.join(&numbered_filename);

        tokio::fs::write(&file_path, data).await?;

        let record = FileMetadata {
            id: id.clone(),
            filename: filename.to_string(),
            description: description.to_string(),
            file_type: determine_file_type(&extension),
            extension,
            file_path: file_path.to_string_lossy().to_string(),
            size_bytes: data.len() as u64,
            created_at: chrono::Utc::now(),
            created_by,
            tags,
            metadata,
        };

        state.files.insert(id.clone(), record.clone());
        self.persist_index(&state).await?;
        Ok(record)
    }

    pub async fn store_file_from_path(
        &self,
        source: &Path,
        description: &str,
        created_by: Option<String>,
        tags: Vec<String>,
        metadata: Map,
    ) -> Result<FileMetadata> {
        let data = tokio::fs::read(source).await?;
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string());
        self.store_file(&data, &filename, description, created_by, tags, metadata)
            .await
    }

    pub async fn get_file(&self, id: &str) -> Option<FileMetadata> {
        self.state.lock().await.files.get(id).cloned()
    }

    pub async fn get_file_content(&self, id: &str) -> Result<Vec<u8>> {
        let path = {
            let state = self.state.lock().await;
            let record = state
                .files
                .get(id)
                .ok_or_else(|| SpiralError::NotFound(format!("file {id} not found")))?;
            PathBuf::from(&record.file_path)
        };
        Ok(tokio::fs::read(path).await?)
    }

    pub async fn list_files(
        &self,
        file_type: Option<FileType>,
        tags: Option<&[String]>,
        created_by: Option<&str>,
        limit: Option<usize>,
    ) -> Vec<FileMetadata> {
        let state = self.state.lock().await;
        let mut matches: Vec<FileMetadata> = state
            .files
            .values()
            .filter(|f| file_type.map_or(true, |t| f.file_type == t))
            .filter(|f| {
                tags.map_or(true, |required| required.iter().all(|t| f.tags.contains(t)))
            })
            .filter(|f| created_by.map_or(true, |creator| f.created_by.as_deref() == Some(creator)))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            matches.truncate(limit);
        }
        matches
    }

    pub async fn search_files(
        &self,
        query: &str,
        file_type: Option<FileType>,
        limit: usize,
    ) -> Vec<FileMetadata> {
        let needle = query.to_lowercase();
        let state = self.state.lock().await;
        let mut matches: Vec<FileMetadata> = state
            .files
            .values()
            .filter(|f| file_type.map_or(true, |t| f.file_type == t))
            .filter(|f| {
                f.filename.to_lowercase().contains(&needle)
                    || f.description.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches.truncate(limit);
        matches
    }

    pub async fn delete_file(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(record) = state.files.remove(id) else {
            return Ok(false);
        };
        let _ = tokio::fs::remove_file(&record.file_path).await;
        self.persist_index(&state).await?;
        Ok(true)
    }

    pub async fn update_file_metadata(
        &self,
        id: &str,
        description: Option<String>,
        tags: Option<Vec<String>>,
        metadata: Option<Map>,
    ) -> Result<Option<FileMetadata>> {
        let mut state = self.state.lock().await;
        let Some(record) = state.files.get_mut(id) else {
            return Ok(None);
        };
        if let Some(description) = description {
            record.description = description;
        }
        if let Some(tags) = tags {
            record.tags = tags;
        }
        if let Some(metadata) = metadata {
            record.metadata = metadata;
        }
        let updated = record.clone();
        self.persist_index(&state).await?;
        Ok(Some(updated))
    }

    pub async fn get_all_files(&self) -> Vec<FileMetadata> {
        self.state.lock().await.files.values().cloned().collect()
    }

    pub async fn get_file_count(&self) -> usize {
        self.state.lock().await.files.len()
    }
}
