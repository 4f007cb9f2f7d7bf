use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::agents::descriptor::DescriptorManifest;
use crate::{Result, SpiralError};

/// Registers descriptor values at startup instead of scanning a filesystem
/// `agents/` directory (spec.md §9's "dynamic discovery -> typed
/// registration" redesign flag). `discover()` walks a fixed module list
/// supplied at construction; one broken module is logged and skipped
/// rather than failing the whole registry, preserving spec.md §4.5's
/// failure mode.
pub struct AgentRegistry {
    descriptors: RwLock<HashMap<String, DescriptorManifest>>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            descriptors: RwLock::new(HashMap::new()),
        }
    }

    /// Recommended registration path: register a batch of pipeline
    /// descriptors up front. Rejects duplicate `asset_key`s, since the
    /// protocol requires they stay unique across descriptors.
    pub async fn register_pipeline_agents(&self, descriptors: Vec<DescriptorManifest>) -> Result<()> {
        let mut guard = self.descriptors.write().await;
        let mut seen_asset_keys: HashMap<String, String> = guard
            .values()
            .map(|d| (d.asset_key.clone(), d.agent_name.clone()))
            .collect();

        for descriptor in descriptors {
            if let Some(existing) = seen_asset_keys.get(&descriptor.asset_key) {
                return Err(SpiralError::Discovery(format!(
                    "asset_key '{}' already claimed by '{existing}', cannot register '{}'",
                    descriptor.asset_key, descriptor.agent_name
                )));
            }
            seen_asset_keys.insert(descriptor.asset_key.clone(), descriptor.agent_name.clone());
            guard.insert(descriptor.agent_name.clone(), descriptor);
        }
        Ok(())
    }

    /// Registers one descriptor, logging and skipping on failure rather
    /// than propagating — this is the per-module discovery failure mode.
    pub async fn try_register(&self, descriptor: DescriptorManifest) {
        let name = descriptor.agent_name.clone();
        if let Err(e) = self.register_pipeline_agents(vec![descriptor]).await {
            tracing::warn!(agent = %name, error = %e, "skipping agent registration");
        }
    }

    pub async fn get_descriptor(&self, agent_name: &str) -> Option<DescriptorManifest> {
        self.descriptors.read().await.get(agent_name).cloned()
    }

    pub async fn list_agents(&self) -> Vec<String> {
        self.descriptors.read().await.keys().cloned().collect()
    }

    pub async fn is_registered(&self, agent_name: &str) -> bool {
        self.descriptors.read().await.contains_key(agent_name)
    }

    pub async fn count(&self) -> usize {
        self.descriptors.read().await.len()
    }

    pub async fn reload(&self, descriptors: Vec<DescriptorManifest>) -> Result<()> {
        self.descriptors.write().await.clear();
        self.register_pipeline_agents(descriptors).await
    }

    /// Resolves the descriptor that produces `asset_key`, used by the
    /// assistant's input-packaging boundary to map completed executions
    /// back onto asset map entries.
    pub async fn find_by_asset_key(&self, asset_key: &str) -> Option<DescriptorManifest> {
        self.descriptors
            .read()
            .await
            .values()
            .find(|d| d.asset_key == asset_key)
            .cloned()
    }
}

pub type SharedAgentRegistry = Arc<AgentRegistry>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::descriptor::{AgentFactory, BuildInputFn, EvaluatorFactory};
    use crate::agents::evaluator::{DefaultEvaluator, Evaluator};
    use crate::llm::LlmClient;
    use std::collections::HashMap as Map;

    fn descriptor(name: &str, asset_key: &str) -> DescriptorManifest {
        let agent_factory: AgentFactory = Arc::new(|_llm| {
            struct Noop;
            #[async_trait::async_trait]
            impl crate::agents::descriptor::SubAgent for Noop {
                async fn run(
                    &self,
                    _input: serde_json::Value,
                    _upstream: crate::models::Map,
                    _ctx: Option<&crate::agents::descriptor::MaterializeContext>,
                ) -> crate::Result<crate::models::Map> {
                    Ok(crate::models::Map::new())
                }
            }
            Arc::new(Noop)
        });
        let evaluator_factory: EvaluatorFactory = Arc::new(|| Arc::new(DefaultEvaluator) as Arc<dyn Evaluator>);
        let build_input: BuildInputFn = Arc::new(|_p, _d, _a, _c| serde_json::json!({}));

        DescriptorManifest {
            agent_name: name.to_string(),
            asset_key: asset_key.to_string(),
            asset_type: "v1".to_string(),
            upstream_keys: vec![],
            catalog_entry: "test".to_string(),
            user_text_key: None,
            agent_factory,
            evaluator_factory,
            build_input,
            build_upstream: None,
            service_factories: Map::new(),
            materializer_factory: None,
        }
    }

    #[allow(unused)]
    fn _unused_llm_type_anchor(_x: &dyn LlmClient) {}

    #[tokio::test]
    async fn register_and_lookup_by_name() {
        let registry = AgentRegistry::new();
        registry
            .register_pipeline_agents(vec![descriptor("story_agent", "story_blueprint")])
            .await
            .unwrap();
        assert!(registry.is_registered("story_agent").await);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn duplicate_asset_key_is_rejected() {
        let registry = AgentRegistry::new();
        registry
            .register_pipeline_agents(vec![descriptor("story_agent", "story_blueprint")])
            .await
            .unwrap();
        let result = registry
            .register_pipeline_agents(vec![descriptor("other_agent", "story_blueprint")])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn find_by_asset_key_resolves_producer() {
        let registry = AgentRegistry::new();
        registry
            .register_pipeline_agents(vec![descriptor("story_agent", "story_blueprint")])
            .await
            .unwrap();
        let found = registry.find_by_asset_key("story_blueprint").await.unwrap();
        assert_eq!(found.agent_name, "story_agent");
    }
}
