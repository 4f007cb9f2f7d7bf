use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::agents::descriptor::SharedService;
use crate::agents::{AgentRegistry, MaterializeContext};
use crate::config::AssistantConfig;
use crate::constants::{CONTEXT_MEMORY_CHARS, CONTEXT_RECENT_FILES, CONTEXT_RECENT_LOGS};
use crate::execution::ExecutionStore;
use crate::llm::LlmClient;
use crate::messages::MessageStore;
use crate::models::{AgentExecution, ExecutionStatus, FileMetadata, Map, PipelineConfig, Task};
use crate::task_stack::TaskStackStore;
use crate::workspace::Workspace;
use crate::{Result, SpiralError};

/// Summary returned from `execute_for_task`. Carries the finished execution
/// record plus any files the agent's output caused to be persisted into the
/// workspace, since callers rarely want to re-derive that from `results`.
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    pub execution: AgentExecution,
    pub stored_files: Vec<FileMetadata>,
}

/// Assembles agent inputs, runs one agent against one task, and persists the
/// resulting bookkeeping/assets. Grounded on `assistant/service.py`'s three
/// boundaries: build inputs, run agent, process results.
pub struct AssistantService {
    task_stack: Arc<TaskStackStore>,
    executions: Arc<ExecutionStore>,
    messages: Arc<MessageStore>,
    workspace: Arc<Workspace>,
    registry: Arc<AgentRegistry>,
    llm: Arc<dyn LlmClient>,
    config: AssistantConfig,
    shared_services: Mutex<HashMap<String, SharedService>>,
}

impl AssistantService {
    pub fn new(
        task_stack: Arc<TaskStackStore>,
        executions: Arc<ExecutionStore>,
        messages: Arc<MessageStore>,
        workspace: Arc<Workspace>,
        registry: Arc<AgentRegistry>,
        llm: Arc<dyn LlmClient>,
        config: AssistantConfig,
    ) -> Self {
        Self {
            task_stack,
            executions,
            messages,
            workspace,
            registry,
            llm,
            config,
            shared_services: Mutex::new(HashMap::new()),
        }
    }

    /// Strips `_`-prefixed bookkeeping keys a producing agent attached to its
    /// own results before those results are handed on as another agent's
    /// upstream input.
    fn strip_internal_keys(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .filter(|(k, _)| !k.starts_with('_'))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    async fn latest_completed_for_agent(&self, agent_name: &str, task_id: &str) -> Option<AgentExecution> {
        let mut candidates: Vec<AgentExecution> = self
            .executions
            .list_by_task(task_id)
            .await
            .into_iter()
            .filter(|e| e.agent_id == agent_name && e.status == ExecutionStatus::Completed)
            .collect();
        candidates.sort_by_key(|e| e.completed_at);
        candidates.pop()
    }

    /// Boundary 1: assembles the asset map an agent's `build_input` will read
    /// from. Seeds `draft_idea`/`source_text` off the task's single
    /// `overall_description` field, resolves each declared upstream key to
    /// its producer's latest completed output, attaches workspace file/
    /// memory/log context scoped to this agent and task, then lets
    /// `additional_inputs` override anything.
    async fn build_assets(
        &self,
        descriptor: &crate::agents::DescriptorManifest,
        task: &Task,
        additional_inputs: Option<&Map>,
    ) -> Result<Map> {
        let mut assets = Map::new();
        if let Some(v) = task.description.get("overall_description") {
            assets.insert("draft_idea".to_string(), v.clone());
            assets.insert("source_text".to_string(), v.clone());
        }

        for key in &descriptor.upstream_keys {
            if let Some(user_key) = &descriptor.user_text_key {
                if user_key == key {
                    if let Some(v) = task.description.get(key) {
                        assets.insert(key.clone(), v.clone());
                        continue;
                    }
                }
            }
            let Some(producer) = self.registry.find_by_asset_key(key).await else {
                continue;
            };
            let Some(execution) = self.latest_completed_for_agent(&producer.agent_name, &task.id).await else {
                continue;
            };
            if let Some(results) = &execution.results {
                if let Some(value) = results.get(key) {
                    assets.insert(key.clone(), Self::strip_internal_keys(value));
                }
            }
        }

        let memory = self.workspace.memory.read().await;
        let memory_preview: String = memory.chars().take(CONTEXT_MEMORY_CHARS).collect();
        assets.insert(
            "_workspace_memory".to_string(),
            serde_json::Value::String(memory_preview),
        );

        let by_creator = self
            .workspace
            .files
            .list_files(None, None, Some(&descriptor.agent_name), Some(CONTEXT_RECENT_FILES))
            .await;
        let by_task_tag = self
            .workspace
            .files
            .list_files(None, Some(&[task.id.clone()]), None, Some(CONTEXT_RECENT_FILES))
            .await;
        let mut seen_file_ids = std::collections::HashSet::new();
        let recent_files: Vec<_> = by_creator
            .into_iter()
            .chain(by_task_tag)
            .filter(|f| seen_file_ids.insert(f.id.clone()))
            .collect();
        assets.insert(
            "_workspace_files".to_string(),
            serde_json::to_value(&recent_files).unwrap_or(serde_json::Value::Null),
        );

        let recent_logs = self
            .workspace
            .logs
            .get_recent_logs(Some(&descriptor.agent_name), Some(&task.id), CONTEXT_RECENT_LOGS)
            .await;
        assets.insert(
            "_workspace_logs".to_string(),
            serde_json::to_value(&recent_logs).unwrap_or(serde_json::Value::Null),
        );

        if let Some(overrides) = additional_inputs {
            for (k, v) in overrides {
                assets.insert(k.clone(), v.clone());
            }
        }

        Ok(assets)
    }

    fn resolve_pipeline_config(assets: &Map) -> PipelineConfig {
        let overrides = assets
            .get("_pipeline_config")
            .and_then(|v| serde_json::from_value::<PipelineConfig>(v.clone()).ok())
            .unwrap_or_default();
        PipelineConfig::default().merged_over(&overrides)
    }

    /// Read-only variant of boundary 1, exposed for
    /// `GET /api/assistant/agents/{id}/inputs` so callers can inspect what
    /// an agent would be given without actually running it.
    pub async fn preview_agent_inputs(&self, agent_id: &str, task_id: &str) -> Result<Map> {
        let descriptor = self
            .registry
            .get_descriptor(agent_id)
            .await
            .ok_or_else(|| SpiralError::NotFound(format!("agent {agent_id} not registered")))?;
        let task = self
            .task_stack
            .get_task(task_id)
            .await
            .ok_or_else(|| SpiralError::NotFound(format!("task {task_id} not found")))?;
        self.build_assets(&descriptor, &task, None).await
    }

    /// Runs one agent against one task end to end: builds inputs, executes
    /// the agent under full `Execution` bookkeeping, then stores any files
    /// the output declares.
    pub async fn execute_for_task(
        &self,
        agent_id: &str,
        task_id: &str,
        additional_inputs: Option<Map>,
    ) -> Result<ExecutionSummary> {
        let descriptor = self
            .registry
            .get_descriptor(agent_id)
            .await
            .ok_or_else(|| SpiralError::NotFound(format!("agent {agent_id} not registered")))?;
        let task = self
            .task_stack
            .get_task(task_id)
            .await
            .ok_or_else(|| SpiralError::NotFound(format!("task {task_id} not found")))?;

        let assets = self.build_assets(&descriptor, &task, additional_inputs.as_ref()).await?;
        let pipeline_config = Self::resolve_pipeline_config(&assets);
        let upstream = descriptor.build_upstream(&assets).unwrap_or_default();
        let input = descriptor.build_input(&self.workspace.workspace_id, &task_id.to_string(), &assets, &pipeline_config);

        let mut execution = self
            .executions
            .create(agent_id.to_string(), task_id.to_string(), assets.clone(), None)
            .await;
        execution.status = ExecutionStatus::InProgress;
        execution.started_at = Some(chrono::Utc::now());
        execution = self.executions.update(execution).await?;

        let (agent, evaluator, materializer) = {
            let mut shared = self.shared_services.lock().await;
            descriptor.build_equipped_agent(self.llm.clone(), &mut shared)
        };

        let scratch_dir = std::env::temp_dir().join(format!("materialize_{}", execution.id));
        let materialize_ctx = MaterializeContext {
            scratch_dir: scratch_dir.clone(),
        };

        let run_result = agent.run(input, upstream.clone(), Some(&materialize_ctx)).await;

        let stored_files = match run_result {
            Ok(mut results) => {
                let structure_errors = evaluator.check_structure(&results, Some(&upstream)).await;
                if !structure_errors.is_empty() {
                    execution.status = ExecutionStatus::Failed;
                    execution.error = Some(format!("structure check failed: {structure_errors:?}"));
                    execution.completed_at = Some(chrono::Utc::now());
                    self.executions.update(execution.clone()).await?;
                    return Err(SpiralError::Structure(structure_errors));
                }

                if let Some(materializer) = &materializer {
                    if let Some(asset_spec) = results.get(&descriptor.asset_key).cloned() {
                        let asset_spec_map: Map = asset_spec
                            .as_object()
                            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                            .unwrap_or_default();
                        let generated = materializer
                            .materialize(&self.workspace.workspace_id, &asset_spec_map, &results)
                            .await?;
                        let mut files = Vec::new();
                        for media_asset in &generated {
                            let path = materialize_ctx.persist_binary(media_asset).await?;
                            let data = tokio::fs::read(&path).await?;
                            let file = self
                                .workspace
                                .store_file(
                                    &data,
                                    &format!("{}{}", media_asset.sys_id, media_asset.extension),
                                    &format!("materialized asset for {}", descriptor.asset_key),
                                    Some(agent_id.to_string()),
                                    vec![task_id.to_string()],
                                    Map::new(),
                                )
                                .await?;
                            files.push(file);
                        }
                        results.insert(
                            descriptor.asset_key.clone(),
                            serde_json::json!({ "media_count": generated.len() }),
                        );
                        if !self.config.keep_materialize_temp_dir {
                            let _ = tokio::fs::remove_dir_all(&scratch_dir).await;
                        }

                        let creative = evaluator.evaluate_creative(&results, Some(&upstream)).await;
                        let asset_eval = evaluator.evaluate_asset(&results, Some(&upstream)).await;
                        if !creative.overall_pass {
                            execution.status = ExecutionStatus::Failed;
                            execution.error = Some(format!("creative evaluation rejected: {}", creative.summary));
                            execution.completed_at = Some(chrono::Utc::now());
                            self.executions.update(execution.clone()).await?;
                            return Err(SpiralError::CreativeRejection(creative.summary));
                        }
                        if !asset_eval.overall_pass {
                            execution.status = ExecutionStatus::Failed;
                            execution.error = Some(format!("asset evaluation failed: {}", asset_eval.summary));
                            execution.completed_at = Some(chrono::Utc::now());
                            self.executions.update(execution.clone()).await?;
                            return Err(SpiralError::AssetFailure(asset_eval.summary));
                        }

                        execution.results = Some(results);
                        execution.status = ExecutionStatus::Completed;
                        execution.completed_at = Some(chrono::Utc::now());
                        self.executions.update(execution.clone()).await?;
                        self.task_stack
                            .update_task(task_id, None, None, None, execution.results.clone())
                            .await?;
                        files
                    } else {
                        execution.results = Some(results);
                        execution.status = ExecutionStatus::Completed;
                        execution.completed_at = Some(chrono::Utc::now());
                        self.executions.update(execution.clone()).await?;
                        Vec::new()
                    }
                } else {
                    let creative = evaluator.evaluate_creative(&results, Some(&upstream)).await;
                    if !creative.overall_pass {
                        execution.status = ExecutionStatus::Failed;
                        execution.error = Some(format!("creative evaluation rejected: {}", creative.summary));
                        execution.completed_at = Some(chrono::Utc::now());
                        self.executions.update(execution.clone()).await?;
                        return Err(SpiralError::CreativeRejection(creative.summary));
                    }
                    execution.results = Some(results);
                    execution.status = ExecutionStatus::Completed;
                    execution.completed_at = Some(chrono::Utc::now());
                    self.executions.update(execution.clone()).await?;
                    self.task_stack
                        .update_task(task_id, None, None, None, execution.results.clone())
                        .await?;
                    Vec::new()
                }
            }
            Err(e) => {
                execution.status = ExecutionStatus::Failed;
                execution.error = Some(e.to_string());
                execution.completed_at = Some(chrono::Utc::now());
                self.executions.update(execution.clone()).await?;
                return Err(e);
            }
        };

        self.workspace
            .logs
            .add(
                crate::models::OperationType::Write,
                crate::models::ResourceType::Execution,
                Some(execution.id.clone()),
                Map::new(),
                Some(agent_id.to_string()),
                Some(task_id.to_string()),
            )
            .await?;

        Ok(ExecutionSummary {
            execution,
            stored_files,
        })
    }

    pub fn messages(&self) -> &Arc<MessageStore> {
        &self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::descriptor::{AgentFactory, BuildInputFn, EvaluatorFactory, SubAgent};
    use crate::agents::evaluator::{DefaultEvaluator, Evaluator as _};
    use crate::agents::DescriptorManifest;
    use crate::llm::EchoLlmClient;
    use async_trait::async_trait;

    struct StoryAgent;

    #[async_trait]
    impl SubAgent for StoryAgent {
        async fn run(
            &self,
            input: serde_json::Value,
            _upstream: Map,
            _ctx: Option<&MaterializeContext>,
        ) -> Result<Map> {
            let mut results = Map::new();
            results.insert("story_blueprint".to_string(), serde_json::json!({"outline": input}));
            Ok(results)
        }
    }

    fn story_descriptor() -> DescriptorManifest {
        let agent_factory: AgentFactory = Arc::new(|_llm| Arc::new(StoryAgent));
        let evaluator_factory: EvaluatorFactory = Arc::new(|| Arc::new(DefaultEvaluator) as Arc<dyn crate::agents::Evaluator>);
        let build_input: BuildInputFn = Arc::new(|_p, _d, assets, _c| {
            serde_json::json!({ "draft_idea": assets.get("draft_idea") })
        });

        DescriptorManifest {
            agent_name: "story_agent".to_string(),
            asset_key: "story_blueprint".to_string(),
            asset_type: "story_blueprint_v1".to_string(),
            upstream_keys: vec![],
            catalog_entry: "Generates a story blueprint".to_string(),
            user_text_key: None,
            agent_factory,
            evaluator_factory,
            build_input,
            build_upstream: None,
            service_factories: HashMap::new(),
            materializer_factory: None,
        }
    }

    async fn harness() -> (AssistantService, Arc<TaskStackStore>, String) {
        let task_stack = Arc::new(TaskStackStore::new());
        let executions = Arc::new(ExecutionStore::new());
        let messages = Arc::new(MessageStore::new());
        let dir = tempfile::tempdir().unwrap();
        let workspace = Arc::new(Workspace::new("w1", dir.path().to_str().unwrap()).await.unwrap());
        let registry = Arc::new(AgentRegistry::new());
        registry.register_pipeline_agents(vec![story_descriptor()]).await.unwrap();
        let llm: Arc<dyn LlmClient> = Arc::new(EchoLlmClient);
        let config = AssistantConfig {
            polling_interval_secs: 1.0,
            keep_materialize_temp_dir: false,
        };

        let mut description = Map::new();
        description.insert("overall_description".to_string(), serde_json::json!("a heist film"));
        let task = task_stack.create_task(description).await;

        let service = AssistantService::new(task_stack.clone(), executions, messages, workspace, registry, llm, config);
        (service, task_stack, task.id)
    }

    #[tokio::test]
    async fn execute_for_task_completes_and_writes_results_to_task() {
        let (service, task_stack, task_id) = harness().await;
        let summary = service.execute_for_task("story_agent", &task_id, None).await.unwrap();
        assert_eq!(summary.execution.status, ExecutionStatus::Completed);

        let task = task_stack.get_task(&task_id).await.unwrap();
        assert!(task.results.unwrap().contains_key("story_blueprint"));
    }

    #[tokio::test]
    async fn preview_agent_inputs_seeds_draft_idea_without_running() {
        let (service, _task_stack, task_id) = harness().await;
        let assets = service.preview_agent_inputs("story_agent", &task_id).await.unwrap();
        assert_eq!(assets.get("draft_idea").unwrap(), &serde_json::json!("a heist film"));
    }

    #[tokio::test]
    async fn execute_for_task_rejects_unknown_agent() {
        let (service, _task_stack, task_id) = harness().await;
        let result = service.execute_for_task("no_such_agent", &task_id, None).await;
        assert!(result.is_err());
    }

    struct OutlineAgent;

    #[async_trait]
    impl SubAgent for OutlineAgent {
        async fn run(&self, input: serde_json::Value, _upstream: Map, _ctx: Option<&MaterializeContext>) -> Result<Map> {
            let mut results = Map::new();
            results.insert("outline".to_string(), input);
            results.insert("_debug_info".to_string(), serde_json::json!("internal, never forwarded"));
            Ok(results)
        }
    }

    struct EchoAgent {
        captured: Arc<std::sync::Mutex<Option<serde_json::Value>>>,
    }

    #[async_trait]
    impl SubAgent for EchoAgent {
        async fn run(&self, _input: serde_json::Value, upstream: Map, _ctx: Option<&MaterializeContext>) -> Result<Map> {
            *self.captured.lock().unwrap() = upstream.get("outline").cloned();
            Ok(Map::new())
        }
    }

    /// Upstream resolution must pick the producer's *latest* completed
    /// execution, and must strip `_`-prefixed keys before handing the
    /// result on as another agent's input.
    #[tokio::test]
    async fn upstream_resolution_picks_latest_completed_execution_and_strips_internal_keys() {
        let task_stack = Arc::new(TaskStackStore::new());
        let executions = Arc::new(ExecutionStore::new());
        let messages = Arc::new(MessageStore::new());
        let dir = tempfile::tempdir().unwrap();
        let workspace = Arc::new(Workspace::new("w1", dir.path().to_str().unwrap()).await.unwrap());
        let registry = Arc::new(AgentRegistry::new());

        let outline_agent_factory: AgentFactory = Arc::new(|_llm| Arc::new(OutlineAgent));
        let outline_evaluator_factory: EvaluatorFactory =
            Arc::new(|| Arc::new(DefaultEvaluator) as Arc<dyn crate::agents::Evaluator>);
        let outline_build_input: BuildInputFn =
            Arc::new(|_p, _d, assets, _c| assets.get("draft_idea").cloned().unwrap_or(serde_json::json!("")));
        let outline_descriptor = DescriptorManifest {
            agent_name: "outline_agent".to_string(),
            asset_key: "outline".to_string(),
            asset_type: "outline_v1".to_string(),
            upstream_keys: vec![],
            catalog_entry: "Generates an outline".to_string(),
            user_text_key: None,
            agent_factory: outline_agent_factory,
            evaluator_factory: outline_evaluator_factory,
            build_input: outline_build_input,
            build_upstream: None,
            service_factories: HashMap::new(),
            materializer_factory: None,
        };

        let captured = Arc::new(std::sync::Mutex::new(None));
        let consumer_agent = captured.clone();
        let consumer_agent_factory: AgentFactory =
            Arc::new(move |_llm| Arc::new(EchoAgent { captured: consumer_agent.clone() }) as Arc<dyn SubAgent>);
        let consumer_evaluator_factory: EvaluatorFactory =
            Arc::new(|| Arc::new(DefaultEvaluator) as Arc<dyn crate::agents::Evaluator>);
        let consumer_build_input: BuildInputFn = Arc::new(|_p, _d, _assets, _c| serde_json::json!({}));
        let consumer_descriptor = DescriptorManifest {
            agent_name: "story_agent".to_string(),
            asset_key: "story_blueprint".to_string(),
            asset_type: "story_blueprint_v1".to_string(),
            upstream_keys: vec!["outline".to_string()],
            catalog_entry: "Consumes an outline".to_string(),
            user_text_key: None,
            agent_factory: consumer_agent_factory,
            evaluator_factory: consumer_evaluator_factory,
            build_input: consumer_build_input,
            build_upstream: None,
            service_factories: HashMap::new(),
            materializer_factory: None,
        };

        registry
            .register_pipeline_agents(vec![outline_descriptor, consumer_descriptor])
            .await
            .unwrap();

        let llm: Arc<dyn LlmClient> = Arc::new(EchoLlmClient);
        let config = AssistantConfig {
            polling_interval_secs: 1.0,
            keep_materialize_temp_dir: false,
        };

        let mut description = Map::new();
        description.insert("overall_description".to_string(), serde_json::json!("first draft"));
        let task = task_stack.create_task(description).await;

        let service = AssistantService::new(
            task_stack.clone(),
            executions,
            messages,
            workspace,
            registry,
            llm,
            config,
        );

        service.execute_for_task("outline_agent", &task.id, None).await.unwrap();

        let mut overrides = Map::new();
        overrides.insert("draft_idea".to_string(), serde_json::json!("revised draft"));
        service
            .execute_for_task("outline_agent", &task.id, Some(overrides))
            .await
            .unwrap();

        service.execute_for_task("story_agent", &task.id, None).await.unwrap();

        let seen = captured.lock().unwrap().clone().unwrap();
        assert_eq!(seen, serde_json::json!("revised draft"));
    }
}
