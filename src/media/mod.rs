use async_trait::async_trait;

use crate::Result;

/// Narrow interface to the out-of-scope image/video/audio backends. The
/// keyframe materialization runtime calls through this trait only; prompt
/// construction and retry policy live in `agents::materialize`, not here.
#[async_trait]
pub trait MediaGenerator: Send + Sync {
    /// Text-to-image/video/audio generation (L1/L1.5 global and scene anchors).
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>>;

    /// Edit/inpaint seeded from one or more reference byte buffers
    /// (L2 scene anchors seeded from L1, L3 shots seeded from L2).
    async fn edit(&self, prompt: &str, references: &[Vec<u8>]) -> Result<Vec<u8>>;
}

/// Test double returning a small fixed payload instead of calling out.
/// Stands in as the process default until a real adapter is wired.
pub struct NullMediaGenerator;

#[async_trait]
impl MediaGenerator for NullMediaGenerator {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        Ok(format!("generated:{prompt}").into_bytes())
    }

    async fn edit(&self, prompt: &str, references: &[Vec<u8>]) -> Result<Vec<u8>> {
        Ok(format!("edited:{prompt}:refs={}", references.len()).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_generator_produces_deterministic_bytes() {
        let gen = NullMediaGenerator;
        let out = gen.generate("a castle at dusk").await.unwrap();
        assert!(!out.is_empty());
    }
}
