use std::path::PathBuf;

use tokio::sync::Mutex;

use crate::constants::{MEMORY_FULL_RATIO, MEMORY_MAX_LENGTH, MEMORY_TRUNCATE_SOFT_CUT_RATIO};
use crate::models::{MemoryInfo, MemoryWriteResult};
use crate::Result;

/// Soft-cuts `content` down to `MEMORY_MAX_LENGTH`, preferring to cut at the
/// last newline or period at or after `MEMORY_TRUNCATE_SOFT_CUT_RATIO · max`.
/// Falls back to a hard cut at `max` when no such boundary exists.
fn truncate_with_notice(content: &str) -> (String, bool) {
    if content.chars().count() <= MEMORY_MAX_LENGTH {
        return (content.to_string(), false);
    }

    let chars: Vec<char> = content.chars().collect();
    let hard_cut = MEMORY_MAX_LENGTH;
    let soft_floor = (MEMORY_MAX_LENGTH as f64 * MEMORY_TRUNCATE_SOFT_CUT_RATIO) as usize;

    let mut cut = hard_cut;
    for i in (soft_floor..hard_cut).rev() {
        if chars[i] == '\n' || chars[i] == '.' {
            cut = i + 1;
            break;
        }
    }

    let truncated: String = chars[..cut].iter().collect();
    let notice = format!(
        "\n\n---\n*[Memory truncated due to length limit. Original length: {} characters]*\n",
        chars.len()
    );
    (truncated + &notice, true)
}

/// Bounded markdown memory blob backed by `global_memory.md`.
///
/// Grounded on `assistant/workspace/memory_manager.py`.
pub struct MemoryManager {
    path: PathBuf,
    content: Mutex<String>,
}

impl MemoryManager {
    pub async fn new(runtime_path: PathBuf) -> Result<Self> {
        let path = runtime_path.join("global_memory.md");
        let content = if path.exists() {
            tokio::fs::read_to_string(&path).await?
        } else {
            String::new()
        };
        Ok(Self {
            path,
            content: Mutex::new(content),
        })
    }

    async fn persist(&self, content: &str) -> Result<()> {
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }

    pub async fn read(&self) -> String {
        self.content.lock().await.clone()
    }

    pub async fn write(&self, text: &str, append: bool) -> Result<MemoryWriteResult> {
        let mut guard = self.content.lock().await;
        let candidate = if append && !guard.is_empty() {
            format!("{}\n\n{}", *guard, text)
        } else {
            text.to_string()
        };
        let original_length = candidate.chars().count();

        let (final_content, was_truncated) = truncate_with_notice(&candidate);
        let final_length = final_content.chars().count();
        *guard = final_content.clone();
        self.persist(&final_content).await?;

        Ok(MemoryWriteResult {
            success: true,
            was_truncated,
            original_length,
            final_length,
            message: if was_truncated {
                "Memory written; content was truncated to fit the length cap.".to_string()
            } else {
                "Memory written.".to_string()
            },
        })
    }

    pub async fn append(&self, text: &str) -> Result<MemoryWriteResult> {
        self.write(text, true).await
    }

    pub async fn clear(&self) -> Result<()> {
        let mut guard = self.content.lock().await;
        guard.clear();
        self.persist("").await
    }

    pub async fn length(&self) -> usize {
        self.content.lock().await.chars().count()
    }

    pub async fn is_full(&self) -> bool {
        let len = self.length().await as f64;
        len >= MEMORY_MAX_LENGTH as f64 * MEMORY_FULL_RATIO
    }

    pub async fn get_memory_info(&self) -> MemoryInfo {
        MemoryInfo {
            length: self.length().await,
            max_length: MEMORY_MAX_LENGTH,
            is_full: self.is_full().await,
        }
    }
}
