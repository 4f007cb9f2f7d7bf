use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::models::{Map, PipelineConfig};
use crate::Result;

/// A generated binary asset, not yet written to disk. The materializer
/// never touches the filesystem itself; `AssistantService` persists the
/// bytes and writes the resulting URI back into `uri_holder["uri"]`.
/// Grounded on `agents/keyframe/materializer.py`'s `MediaAsset`.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub sys_id: String,
    pub data: Vec<u8>,
    pub extension: String,
    pub uri_holder: Map,
}

/// Scratch directory handed to a running agent so its materializer can
/// request binaries be written to disk without owning the path itself.
pub struct MaterializeContext {
    pub scratch_dir: PathBuf,
}

impl MaterializeContext {
    pub async fn persist_binary(&self, asset: &MediaAsset) -> Result<String> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let path = self
            .scratch_dir
            .join(format!("{}{}", asset.sys_id, asset.extension));
        tokio::fs::write(&path, &asset.data).await?;
        Ok(path.to_string_lossy().to_string())
    }
}

/// One pluggable sub-agent's run contract. Typed input/output are modeled
/// as `serde_json::Value`/`Map` per SPEC_FULL.md §3: the agent authors' own
/// domain schemas are out of scope, only the dispatch shape is specified.
#[async_trait]
pub trait SubAgent: Send + Sync {
    async fn run(
        &self,
        input: serde_json::Value,
        upstream: Map,
        materialize_ctx: Option<&MaterializeContext>,
    ) -> Result<Map>;
}

/// Post-LLM binary generator. Pure: given an already-validated plan, it
/// returns `MediaAsset`s and never writes to the filesystem.
#[async_trait]
pub trait Materializer: Send + Sync {
    async fn materialize(&self, project_id: &str, asset: &Map, assets: &Map) -> Result<Vec<MediaAsset>>;
}

pub type SharedService = Arc<dyn Any + Send + Sync>;
pub type ServiceFactory = Arc<dyn Fn() -> SharedService + Send + Sync>;
pub type AgentFactory = Arc<dyn Fn(Arc<dyn LlmClient>) -> Arc<dyn SubAgent> + Send + Sync>;
pub type EvaluatorFactory = Arc<dyn Fn() -> Arc<dyn super::evaluator::Evaluator> + Send + Sync>;
pub type BuildInputFn =
    Arc<dyn Fn(&str, &str, &Map, &PipelineConfig) -> serde_json::Value + Send + Sync>;
pub type BuildUpstreamFn = Arc<dyn Fn(&Map) -> Option<Map> + Send + Sync>;
pub type MaterializerFactory =
    Arc<dyn Fn(&HashMap<String, SharedService>) -> Arc<dyn Materializer> + Send + Sync>;

/// Immutable manifest describing one sub-agent: identity, upstream/
/// downstream asset keys, input builder, evaluator, materializer, and
/// shared service factories. Grounded on spec.md §4.5's descriptor
/// protocol and the original `agents/*/descriptor.py` files.
#[derive(Clone)]
pub struct DescriptorManifest {
    pub agent_name: String,
    pub asset_key: String,
    pub asset_type: String,
    pub upstream_keys: Vec<String>,
    pub catalog_entry: String,
    /// Optional asset key under which raw user-provided text bypasses the
    /// upstream pipeline output (`original_source/agents/story/descriptor.py`).
    pub user_text_key: Option<String>,
    pub agent_factory: AgentFactory,
    pub evaluator_factory: EvaluatorFactory,
    pub build_input: BuildInputFn,
    pub build_upstream: Option<BuildUpstreamFn>,
    pub service_factories: HashMap<String, ServiceFactory>,
    pub materializer_factory: Option<MaterializerFactory>,
}

impl std::fmt::Debug for DescriptorManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorManifest")
            .field("agent_name", &self.agent_name)
            .field("asset_key", &self.asset_key)
            .field("asset_type", &self.asset_type)
            .field("upstream_keys", &self.upstream_keys)
            .finish()
    }
}

impl DescriptorManifest {
    /// Auto-derives `upstream` from `upstream_keys` when the descriptor
    /// doesn't supply its own `build_upstream`.
    pub fn build_upstream(&self, assets: &Map) -> Option<Map> {
        if let Some(f) = &self.build_upstream {
            return f(assets);
        }
        let mut upstream = Map::new();
        for key in &self.upstream_keys {
            if let Some(value) = assets.get(key) {
                upstream.insert(key.clone(), value.clone());
            }
        }
        Some(upstream)
    }

    pub fn build_input(&self, project_id: &str, draft_id: &str, assets: &Map, config: &PipelineConfig) -> serde_json::Value {
        (self.build_input)(project_id, draft_id, assets, config)
    }

    /// Equips an agent with its evaluator and (if declared) materializer,
    /// sharing service instances across descriptors that declare the same
    /// service key.
    pub fn build_equipped_agent(
        &self,
        llm: Arc<dyn LlmClient>,
        shared_services: &mut HashMap<String, SharedService>,
    ) -> (Arc<dyn SubAgent>, Arc<dyn super::evaluator::Evaluator>, Option<Arc<dyn Materializer>>) {
        let agent = (self.agent_factory)(llm);
        let evaluator = (self.evaluator_factory)();

        for (key, factory) in &self.service_factories {
            shared_services
                .entry(key.clone())
                .or_insert_with(|| factory());
        }

        let materializer = self
            .materializer_factory
            .as_ref()
            .map(|f| f(shared_services));

        (agent, evaluator, materializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::evaluator::{DefaultEvaluator, Evaluator};

    struct EchoAgent;

    #[async_trait]
    impl SubAgent for EchoAgent {
        async fn run(
            &self,
            _input: serde_json::Value,
            _upstream: Map,
            _materialize_ctx: Option<&MaterializeContext>,
        ) -> Result<Map> {
            Ok(Map::new())
        }
    }

    fn test_descriptor() -> DescriptorManifest {
        DescriptorManifest {
            agent_name: "story_agent".to_string(),
            asset_key: "story_blueprint".to_string(),
            asset_type: "story_blueprint_v1".to_string(),
            upstream_keys: vec!["draft_idea".to_string()],
            catalog_entry: "Generates a story blueprint from a draft idea".to_string(),
            user_text_key: Some("user_story_outline".to_string()),
            agent_factory: Arc::new(|_llm| Arc::new(EchoAgent)),
            evaluator_factory: Arc::new(|| Arc::new(DefaultEvaluator) as Arc<dyn Evaluator>),
            build_input: Arc::new(|_project, _draft, assets, _config| {
                serde_json::json!({ "draft_idea": assets.get("draft_idea") })
            }),
            build_upstream: None,
            service_factories: HashMap::new(),
            materializer_factory: None,
        }
    }

    #[test]
    fn build_upstream_auto_derives_from_upstream_keys() {
        let descriptor = test_descriptor();
        let mut assets = Map::new();
        assets.insert("draft_idea".to_string(), serde_json::json!("a heist film"));
        assets.insert("unrelated".to_string(), serde_json::json!(true));

        let upstream = descriptor.build_upstream(&assets).unwrap();
        assert_eq!(upstream.len(), 1);
        assert!(upstream.contains_key("draft_idea"));
    }

    #[tokio::test]
    async fn build_equipped_agent_shares_service_instances_by_key() {
        let mut descriptor_a = test_descriptor();
        descriptor_a.service_factories.insert(
            "image_client".to_string(),
            Arc::new(|| Arc::new(42i32) as SharedService),
        );
        let mut descriptor_b = test_descriptor();
        descriptor_b.agent_name = "other_agent".to_string();
        descriptor_b.service_factories.insert(
            "image_client".to_string(),
            Arc::new(|| Arc::new(99i32) as SharedService),
        );

        let llm: Arc<dyn LlmClient> = Arc::new(crate::llm::EchoLlmClient);
        let mut shared = HashMap::new();
        descriptor_a.build_equipped_agent(llm.clone(), &mut shared);
        descriptor_b.build_equipped_agent(llm, &mut shared);

        let value = shared.get("image_client").unwrap().downcast_ref::<i32>().unwrap();
        assert_eq!(*value, 42, "first descriptor to declare the key wins");
    }
}
