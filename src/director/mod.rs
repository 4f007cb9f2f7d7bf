use std::sync::Arc;

use async_trait::async_trait;

use crate::assistant::AssistantService;
use crate::messages::MessageStore;
use crate::models::{SenderType, Task};
use crate::task_stack::TaskStackStore;
use crate::Result;

/// One cycle's decision: which agent to run next, against which task, or to
/// stand down for this tick. The reasoning behind that choice is explicitly
/// out of scope (spec.md §1); `DirectorPolicy` is the seam a real planner
/// plugs into.
#[derive(Debug, Clone)]
pub enum DirectorAction {
    RunAgent { agent_id: String, task_id: String },
    Idle,
}

/// Pluggable "what to do next" decision. The poll/delegate/reflect loop
/// below is fixed; only this trait varies.
#[async_trait]
pub trait DirectorPolicy: Send + Sync {
    async fn plan(&self, task_stack: &TaskStackStore, messages: &MessageStore) -> Result<DirectorAction>;
}

/// Always runs whatever agent the next pending task's description names
/// under `"next_agent"`, skipping tasks that don't declare one. Serves as
/// the process default and as a policy test double.
pub struct NextTaskPolicy;

#[async_trait]
impl DirectorPolicy for NextTaskPolicy {
    async fn plan(&self, task_stack: &TaskStackStore, _messages: &MessageStore) -> Result<DirectorAction> {
        let Some(next) = task_stack.get_next_task().await else {
            return Ok(DirectorAction::Idle);
        };
        let task: Option<Task> = task_stack.get_task(&next.task_id).await;
        let agent_id = task
            .as_ref()
            .and_then(|t| t.description.get("next_agent"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        match agent_id {
            Some(agent_id) => Ok(DirectorAction::RunAgent {
                agent_id,
                task_id: next.task_id,
            }),
            None => Ok(DirectorAction::Idle),
        }
    }
}

/// Drives the poll -> plan -> delegate -> reflect loop described in
/// `assistant/director.py`: each tick asks the policy what to do, runs it
/// through the assistant, advances the execution pointer, and posts a
/// director-authored status message.
pub struct Director {
    task_stack: Arc<TaskStackStore>,
    messages: Arc<MessageStore>,
    assistant: Arc<AssistantService>,
    policy: Arc<dyn DirectorPolicy>,
}

impl Director {
    pub fn new(
        task_stack: Arc<TaskStackStore>,
        messages: Arc<MessageStore>,
        assistant: Arc<AssistantService>,
        policy: Arc<dyn DirectorPolicy>,
    ) -> Self {
        Self {
            task_stack,
            messages,
            assistant,
            policy,
        }
    }

    /// Runs a single poll/plan/delegate/reflect cycle and returns the
    /// action taken. The caller (`main.rs`) is responsible for the sleep
    /// between ticks, using `AssistantConfig::polling_interval_secs`.
    pub async fn tick(&self) -> Result<DirectorAction> {
        let action = self.policy.plan(&self.task_stack, &self.messages).await?;

        if let DirectorAction::RunAgent { agent_id, task_id } = &action {
            match self.assistant.execute_for_task(agent_id, task_id, None).await {
                Ok(summary) => {
                    self.task_stack.advance_execution_pointer().await;
                    self.messages
                        .create_user_message(
                            format!("{agent_id} completed for task {task_id} (execution {})", summary.execution.id),
                            SenderType::Director,
                            Some(task_id.clone()),
                        )
                        .await;
                }
                Err(e) => {
                    self.messages
                        .create_user_message(
                            format!("{agent_id} failed for task {task_id}: {e}"),
                            SenderType::Director,
                            Some(task_id.clone()),
                        )
                        .await;
                }
            }
        }

        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::descriptor::{AgentFactory, BuildInputFn, EvaluatorFactory, SubAgent};
    use crate::agents::evaluator::DefaultEvaluator;
    use crate::agents::{AgentRegistry, DescriptorManifest};
    use crate::config::AssistantConfig;
    use crate::execution::ExecutionStore;
    use crate::llm::{EchoLlmClient, LlmClient};
    use crate::models::Map;
    use crate::workspace::Workspace;
    use std::collections::HashMap;

    struct NoopAgent;

    #[async_trait]
    impl SubAgent for NoopAgent {
        async fn run(
            &self,
            _input: serde_json::Value,
            _upstream: Map,
            _ctx: Option<&crate::agents::MaterializeContext>,
        ) -> Result<Map> {
            Ok(Map::new())
        }
    }

    async fn harness() -> (Director, Arc<TaskStackStore>, String) {
        let task_stack = Arc::new(TaskStackStore::new());
        let executions = Arc::new(ExecutionStore::new());
        let messages = Arc::new(MessageStore::new());
        let dir = tempfile::tempdir().unwrap();
        let workspace = Arc::new(Workspace::new("w1", dir.path().to_str().unwrap()).await.unwrap());
        let registry = Arc::new(AgentRegistry::new());

        let agent_factory: AgentFactory = Arc::new(|_llm| Arc::new(NoopAgent));
        let evaluator_factory: EvaluatorFactory = Arc::new(|| Arc::new(DefaultEvaluator) as Arc<dyn crate::agents::Evaluator>);
        let build_input: BuildInputFn = Arc::new(|_p, _d, _a, _c| serde_json::json!({}));
        registry
            .register_pipeline_agents(vec![DescriptorManifest {
                agent_name: "story_agent".to_string(),
                asset_key: "story_blueprint".to_string(),
                asset_type: "v1".to_string(),
                upstream_keys: vec![],
                catalog_entry: "test".to_string(),
                user_text_key: None,
                agent_factory,
                evaluator_factory,
                build_input,
                build_upstream: None,
                service_factories: HashMap::new(),
                materializer_factory: None,
            }])
            .await
            .unwrap();

        let llm: Arc<dyn LlmClient> = Arc::new(EchoLlmClient);
        let config = AssistantConfig {
            polling_interval_secs: 1.0,
            keep_materialize_temp_dir: false,
        };
        let assistant = Arc::new(AssistantService::new(
            task_stack.clone(),
            executions,
            messages.clone(),
            workspace,
            registry,
            llm,
            config,
        ));

        let mut description = Map::new();
        description.insert("next_agent".to_string(), serde_json::json!("story_agent"));
        let task = task_stack.create_task(description).await;
        task_stack.create_layer(None, None, None).await;
        task_stack.add_task_to_layer(0, &task.id, None).await;

        let director = Director::new(task_stack.clone(), messages, assistant, Arc::new(NextTaskPolicy));
        (director, task_stack, task.id)
    }

    #[tokio::test]
    async fn tick_runs_the_declared_agent_and_advances_pointer() {
        let (director, task_stack, _task_id) = harness().await;
        let action = director.tick().await.unwrap();
        assert!(matches!(action, DirectorAction::RunAgent { .. }));
        assert!(task_stack.get_execution_pointer().await.is_some());
    }

    #[tokio::test]
    async fn tick_is_idle_with_no_tasks() {
        let task_stack = Arc::new(TaskStackStore::new());
        let executions = Arc::new(ExecutionStore::new());
        let messages = Arc::new(MessageStore::new());
        let dir = tempfile::tempdir().unwrap();
        let workspace = Arc::new(Workspace::new("w1", dir.path().to_str().unwrap()).await.unwrap());
        let registry = Arc::new(AgentRegistry::new());
        let llm: Arc<dyn LlmClient> = Arc::new(EchoLlmClient);
        let config = AssistantConfig {
            polling_interval_secs: 1.0,
            keep_materialize_temp_dir: false,
        };
        let assistant = Arc::new(AssistantService::new(
            task_stack.clone(),
            executions,
            messages.clone(),
            workspace,
            registry,
            llm,
            config,
        ));
        let director = Director::new(task_stack, messages, assistant, Arc::new(NextTaskPolicy));
        let action = director.tick().await.unwrap();
        assert!(matches!(action, DirectorAction::Idle));
    }
}
