use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Json;
use axum::routing::{delete, get, post, put};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agents::AgentRegistry;
use crate::assistant::AssistantService;
use crate::execution::ExecutionStore;
use crate::messages::MessageStore;
use crate::models::{
    AgentExecution, Assistant, BatchOperation, BatchResult, FileType, Map, SenderType, Task,
    TaskLayer, TaskStatus, UserMessage,
};
use crate::task_stack::TaskStackStore;
use crate::workspace::Workspace;
use crate::{Result, SpiralError};

const SERVICE_NAME: &str = "spiral-forge";

/// Shared handles every handler closes over. Singletons (`Workspace`,
/// `AgentRegistry`, the Assistant's own stores) are explicit constructor
/// arguments here rather than process globals, per spec.md §9.
#[derive(Clone)]
pub struct AppState {
    pub task_stack: Arc<TaskStackStore>,
    pub messages: Arc<MessageStore>,
    pub executions: Arc<ExecutionStore>,
    pub workspace: Arc<Workspace>,
    pub registry: Arc<AgentRegistry>,
    pub assistant: Arc<AssistantService>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/messages/create", post(create_message))
        .route("/api/messages/{id}", get(get_message))
        .route("/api/messages/list", get(list_messages))
        .route("/api/messages/unread", get(unread_messages))
        .route("/api/messages/{id}/read-status", put(update_read_status))
        .route("/api/messages/{id}/check", get(check_message))
        .route("/api/tasks/create", post(create_task))
        .route("/api/tasks/{id}", get(get_task))
        .route("/api/tasks/list", get(list_tasks))
        .route("/api/tasks/{id}", put(update_task))
        .route("/api/tasks/{id}/status", put(update_task_status))
        .route("/api/tasks/{id}", delete(delete_task))
        .route("/api/tasks/{id}/messages", post(create_task_message))
        .route("/api/layers/create", post(create_layer))
        .route("/api/layers/list", get(list_layers))
        .route("/api/layers/{i}", get(get_layer))
        .route("/api/layers/{i}/hooks", put(update_layer_hooks))
        .route("/api/layers/{i}/tasks", post(add_task_to_layer))
        .route("/api/layers/{i}/tasks/{task_id}", delete(remove_task_from_layer))
        .route("/api/layers/{i}/tasks/replace", post(replace_task_in_layer))
        .route("/api/execution-pointer/get", get(get_execution_pointer))
        .route("/api/execution-pointer/set", put(set_execution_pointer))
        .route("/api/execution-pointer/advance", post(advance_execution_pointer))
        .route("/api/task-stack", get(get_task_stack))
        .route("/api/task-stack/next", get(get_next_task))
        .route("/api/task-stack/insert-layer", post(insert_layer_with_tasks))
        .route("/api/task-stack/modify", post(modify_task_stack))
        .route("/api/assistant", get(get_assistant))
        .route("/api/assistant/sub-agents", get(list_sub_agents))
        .route("/api/assistant/sub-agents/{id}", get(get_sub_agent))
        .route("/api/assistant/agents/{id}/inputs", get(get_agent_inputs))
        .route("/api/assistant/execute", post(execute_agent))
        .route("/api/assistant/executions/{id}", get(get_execution))
        .route("/api/assistant/executions/task/{task_id}", get(list_executions_for_task))
        .route("/api/assistant/workspace", get(get_workspace_summary))
        .route("/api/assistant/workspace/summary", get(get_workspace_summary))
        .route("/api/assistant/workspace/files", get(list_files))
        .route("/api/assistant/workspace/files/{id}", get(get_file))
        .route("/api/assistant/workspace/files/search", get(search_files))
        .route("/api/assistant/workspace/memory", get(read_memory).post(write_memory))
        .route("/api/assistant/workspace/logs", get(list_logs))
        .route("/api/assistant/workspace/search", get(search_workspace))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": SERVICE_NAME }))
}

// ---------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateMessageRequest {
    content: String,
    sender_type: SenderType,
    task_id: Option<String>,
}

async fn create_message(
    State(state): State<AppState>,
    Json(req): Json<CreateMessageRequest>,
) -> Json<UserMessage> {
    let message = state
        .messages
        .create_user_message(req.content, req.sender_type, req.task_id)
        .await;
    Json(message)
}

async fn get_message(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<UserMessage>> {
    state
        .messages
        .get_message(&id)
        .await
        .map(Json)
        .ok_or_else(|| SpiralError::NotFound(format!("message {id} not found")))
}

async fn list_messages(State(state): State<AppState>) -> Json<Vec<UserMessage>> {
    Json(state.messages.get_all_messages().await)
}

#[derive(Debug, Deserialize)]
struct UnreadQuery {
    sender_type: Option<SenderType>,
    check_director_read: Option<bool>,
    check_user_read: Option<bool>,
}

async fn unread_messages(
    State(state): State<AppState>,
    Query(q): Query<UnreadQuery>,
) -> Json<Vec<UserMessage>> {
    let messages = state
        .messages
        .list_unread(
            q.sender_type,
            q.check_director_read.unwrap_or(false),
            q.check_user_read.unwrap_or(false),
        )
        .await;
    Json(messages)
}

#[derive(Debug, Deserialize)]
struct ReadStatusRequest {
    director_read: Option<bool>,
    user_read: Option<bool>,
}

async fn update_read_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ReadStatusRequest>,
) -> Result<Json<UserMessage>> {
    state
        .messages
        .update_read_status(&id, req.director_read, req.user_read)
        .await
        .map(Json)
}

#[derive(Debug, Serialize)]
struct MessageCheckResponse {
    message: UserMessage,
    is_new_task: bool,
    task_state: Option<TaskStatus>,
}

async fn check_message(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<MessageCheckResponse>> {
    let message = state
        .messages
        .get_message(&id)
        .await
        .ok_or_else(|| SpiralError::NotFound(format!("message {id} not found")))?;
    let is_new_task = state.messages.is_new_task(&id, &state.task_stack).await;
    let task_state = match &message.task_id {
        Some(task_id) => state.task_stack.get_task(task_id).await.map(|t| t.status),
        None => None,
    };
    Ok(Json(MessageCheckResponse {
        message,
        is_new_task,
        task_state,
    }))
}

// ---------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateTaskRequest {
    description: Map,
}

async fn create_task(State(state): State<AppState>, Json(req): Json<CreateTaskRequest>) -> Json<Task> {
    Json(state.task_stack.create_task(req.description).await)
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Task>> {
    state
        .task_stack
        .get_task(&id)
        .await
        .map(Json)
        .ok_or_else(|| SpiralError::NotFound(format!("task {id} not found")))
}

async fn list_tasks(State(state): State<AppState>) -> Json<Vec<Task>> {
    Json(state.task_stack.get_all_tasks().await)
}

#[derive(Debug, Deserialize)]
struct UpdateTaskRequest {
    description: Option<Map>,
    progress: Option<Map>,
    results: Option<Map>,
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<Task>> {
    state
        .task_stack
        .update_task(&id, req.description, None, req.progress, req.results)
        .await
        .map(Json)
}

#[derive(Debug, Deserialize)]
struct UpdateTaskStatusRequest {
    status: TaskStatus,
}

async fn update_task_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTaskStatusRequest>,
) -> Result<Json<Task>> {
    state
        .task_stack
        .update_task(&id, None, Some(req.status), None, None)
        .await
        .map(Json)
}

async fn delete_task(State(state): State<AppState>, Path(id): Path<String>) -> Json<serde_json::Value> {
    let deleted = state.task_stack.delete_task(&id).await;
    Json(json!({ "deleted": deleted }))
}

#[derive(Debug, Deserialize)]
struct TaskMessageRequest {
    content: String,
    sender_type: SenderType,
}

async fn create_task_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TaskMessageRequest>,
) -> Json<UserMessage> {
    let message = state
        .messages
        .create_user_message(req.content, req.sender_type, Some(id))
        .await;
    Json(message)
}

// ---------------------------------------------------------------------
// Layers
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateLayerRequest {
    layer_index: Option<usize>,
    pre_hook: Option<String>,
    post_hook: Option<String>,
}

async fn create_layer(State(state): State<AppState>, Json(req): Json<CreateLayerRequest>) -> Json<TaskLayer> {
    Json(
        state
            .task_stack
            .create_layer(req.layer_index, req.pre_hook, req.post_hook)
            .await,
    )
}

async fn list_layers(State(state): State<AppState>) -> Json<Vec<TaskLayer>> {
    Json(state.task_stack.get_all_layers().await)
}

async fn get_layer(State(state): State<AppState>, Path(i): Path<usize>) -> Result<Json<TaskLayer>> {
    state
        .task_stack
        .get_layer(i)
        .await
        .map(Json)
        .ok_or_else(|| SpiralError::NotFound(format!("layer {i} not found")))
}

#[derive(Debug, Deserialize)]
struct UpdateHooksRequest {
    pre_hook: Option<String>,
    post_hook: Option<String>,
}

async fn update_layer_hooks(
    State(state): State<AppState>,
    Path(i): Path<usize>,
    Json(req): Json<UpdateHooksRequest>,
) -> Json<serde_json::Value> {
    let ok = state
        .task_stack
        .update_layer_hooks(i, req.pre_hook, req.post_hook)
        .await;
    Json(json!({ "success": ok }))
}

#[derive(Debug, Deserialize)]
struct AddTaskToLayerRequest {
    task_id: String,
    insert_index: Option<usize>,
}

async fn add_task_to_layer(
    State(state): State<AppState>,
    Path(i): Path<usize>,
    Json(req): Json<AddTaskToLayerRequest>,
) -> Json<serde_json::Value> {
    let ok = state
        .task_stack
        .add_task_to_layer(i, &req.task_id, req.insert_index)
        .await;
    Json(json!({ "success": ok }))
}

async fn remove_task_from_layer(
    State(state): State<AppState>,
    Path((i, task_id)): Path<(usize, String)>,
) -> Json<serde_json::Value> {
    let ok = state.task_stack.remove_task_from_layer(i, &task_id).await;
    Json(json!({ "success": ok }))
}

#[derive(Debug, Deserialize)]
struct ReplaceTaskRequest {
    old_id: String,
    new_id: String,
}

async fn replace_task_in_layer(
    State(state): State<AppState>,
    Path(i): Path<usize>,
    Json(req): Json<ReplaceTaskRequest>,
) -> Json<serde_json::Value> {
    let ok = state
        .task_stack
        .replace_task_in_layer(i, &req.old_id, &req.new_id)
        .await;
    Json(json!({ "success": ok }))
}

// ---------------------------------------------------------------------
// Execution pointer / task stack
// ---------------------------------------------------------------------

async fn get_execution_pointer(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "pointer": state.task_stack.get_execution_pointer().await }))
}

#[derive(Debug, Deserialize)]
struct SetPointerRequest {
    layer_index: usize,
    task_index: usize,
    in_pre_hook: Option<bool>,
    in_post_hook: Option<bool>,
}

async fn set_execution_pointer(
    State(state): State<AppState>,
    Json(req): Json<SetPointerRequest>,
) -> Json<serde_json::Value> {
    let ok = state
        .task_stack
        .set_execution_pointer(
            req.layer_index,
            req.task_index,
            req.in_pre_hook.unwrap_or(false),
            req.in_post_hook.unwrap_or(false),
        )
        .await;
    Json(json!({ "success": ok }))
}

async fn advance_execution_pointer(State(state): State<AppState>) -> Json<serde_json::Value> {
    let advanced = state.task_stack.advance_execution_pointer().await;
    Json(json!({ "advanced": advanced, "pointer": state.task_stack.get_execution_pointer().await }))
}

#[derive(Debug, Serialize)]
struct TaskStackResponse {
    tasks: Vec<Task>,
    layers: Vec<TaskLayer>,
    pointer: Option<crate::models::ExecutionPointer>,
}

async fn get_task_stack(State(state): State<AppState>) -> Json<TaskStackResponse> {
    Json(TaskStackResponse {
        tasks: state.task_stack.get_all_tasks().await,
        layers: state.task_stack.get_all_layers().await,
        pointer: state.task_stack.get_execution_pointer().await,
    })
}

async fn get_next_task(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "next_task": state.task_stack.get_next_task().await }))
}

#[derive(Debug, Deserialize)]
struct InsertLayerRequest {
    insert_index: usize,
    task_ids: Vec<String>,
    pre_hook: Option<String>,
    post_hook: Option<String>,
}

async fn insert_layer_with_tasks(
    State(state): State<AppState>,
    Json(req): Json<InsertLayerRequest>,
) -> Result<Json<TaskLayer>> {
    state
        .task_stack
        .insert_layer_with_tasks(req.insert_index, req.task_ids, req.pre_hook, req.post_hook)
        .await
        .map(Json)
        .ok_or_else(|| SpiralError::InvariantViolation("insert_layer_with_tasks rejected by the stack".to_string()))
}

#[derive(Debug, Deserialize)]
struct ModifyTaskStackRequest {
    operations: Vec<BatchOperation>,
}

async fn modify_task_stack(
    State(state): State<AppState>,
    Json(req): Json<ModifyTaskStackRequest>,
) -> Json<BatchResult> {
    Json(state.task_stack.modify_task_stack(req.operations).await)
}

// ---------------------------------------------------------------------
// Assistant
// ---------------------------------------------------------------------

async fn get_assistant() -> Json<Assistant> {
    Json(Assistant::default())
}

#[derive(Debug, Serialize)]
struct SubAgentSummary {
    agent_name: String,
    asset_key: String,
    asset_type: String,
    upstream_keys: Vec<String>,
    catalog_entry: String,
}

async fn list_sub_agents(State(state): State<AppState>) -> Json<Vec<SubAgentSummary>> {
    let mut summaries = Vec::new();
    for name in state.registry.list_agents().await {
        if let Some(d) = state.registry.get_descriptor(&name).await {
            summaries.push(SubAgentSummary {
                agent_name: d.agent_name,
                asset_key: d.asset_key,
                asset_type: d.asset_type,
                upstream_keys: d.upstream_keys,
                catalog_entry: d.catalog_entry,
            });
        }
    }
    Json(summaries)
}

async fn get_sub_agent(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SubAgentSummary>> {
    let descriptor = state
        .registry
        .get_descriptor(&id)
        .await
        .ok_or_else(|| SpiralError::NotFound(format!("agent {id} not registered")))?;
    Ok(Json(SubAgentSummary {
        agent_name: descriptor.agent_name,
        asset_key: descriptor.asset_key,
        asset_type: descriptor.asset_type,
        upstream_keys: descriptor.upstream_keys,
        catalog_entry: descriptor.catalog_entry,
    }))
}

#[derive(Debug, Deserialize)]
struct AgentInputsQuery {
    task_id: String,
}

async fn get_agent_inputs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<AgentInputsQuery>,
) -> Result<Json<Map>> {
    state.assistant.preview_agent_inputs(&id, &q.task_id).await.map(Json)
}

#[derive(Debug, Deserialize)]
struct ExecuteAgentRequest {
    agent_id: String,
    task_id: String,
    additional_inputs: Option<Map>,
}

#[derive(Debug, Serialize)]
struct ExecuteAgentResponse {
    execution: AgentExecution,
    stored_file_ids: Vec<String>,
}

async fn execute_agent(
    State(state): State<AppState>,
    Json(req): Json<ExecuteAgentRequest>,
) -> Result<Json<ExecuteAgentResponse>> {
    let summary = state
        .assistant
        .execute_for_task(&req.agent_id, &req.task_id, req.additional_inputs)
        .await?;
    Ok(Json(ExecuteAgentResponse {
        execution: summary.execution,
        stored_file_ids: summary.stored_files.into_iter().map(|f| f.id).collect(),
    }))
}

async fn get_execution(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<AgentExecution>> {
    state
        .executions
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| SpiralError::NotFound(format!("execution {id} not found")))
}

async fn list_executions_for_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Json<Vec<AgentExecution>> {
    Json(state.executions.list_by_task(&task_id).await)
}

// ---------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------

async fn get_workspace_summary(State(state): State<AppState>) -> Result<Json<crate::workspace::WorkspaceSummary>> {
    state.workspace.get_summary().await.map(Json)
}

#[derive(Debug, Deserialize)]
struct ListFilesQuery {
    file_type: Option<FileType>,
    tags: Option<String>,
    created_by: Option<String>,
    limit: Option<usize>,
}

async fn list_files(
    State(state): State<AppState>,
    Query(q): Query<ListFilesQuery>,
) -> Json<Vec<crate::models::FileMetadata>> {
    let tags: Option<Vec<String>> = q
        .tags
        .map(|t| t.split(',').map(|s| s.trim().to_string()).collect());
    Json(
        state
            .workspace
            .files
            .list_files(q.file_type, tags.as_deref(), q.created_by.as_deref(), q.limit)
            .await,
    )
}

async fn get_file(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<crate::models::FileMetadata>> {
    state
        .workspace
        .files
        .get_file(&id)
        .await
        .ok_or_else(|| SpiralError::NotFound(format!("file {id} not found")))
        .map(Json)
}

#[derive(Debug, Deserialize)]
struct SearchFilesQuery {
    query: String,
    file_type: Option<FileType>,
    limit: Option<usize>,
}

async fn search_files(
    State(state): State<AppState>,
    Query(q): Query<SearchFilesQuery>,
) -> Json<Vec<crate::models::FileMetadata>> {
    let limit = q.limit.unwrap_or(crate::constants::DEFAULT_FILE_SEARCH_LIMIT);
    Json(state.workspace.files.search_files(&q.query, q.file_type, limit).await)
}

async fn read_memory(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "content": state.workspace.memory.read().await,
        "info": state.workspace.memory.get_memory_info().await,
    }))
}

#[derive(Debug, Deserialize)]
struct WriteMemoryRequest {
    content: String,
    append: Option<bool>,
}

async fn write_memory(
    State(state): State<AppState>,
    Json(req): Json<WriteMemoryRequest>,
) -> Result<Json<crate::models::MemoryWriteResult>> {
    state
        .workspace
        .write_memory(&req.content, req.append.unwrap_or(false))
        .await
        .map(Json)
}

#[derive(Debug, Deserialize)]
struct ListLogsQuery {
    operation_type: Option<crate::models::OperationType>,
    resource_type: Option<crate::models::ResourceType>,
    agent_id: Option<String>,
    task_id: Option<String>,
    limit: Option<usize>,
}

async fn list_logs(
    State(state): State<AppState>,
    Query(q): Query<ListLogsQuery>,
) -> Json<Vec<crate::models::LogEntry>> {
    let limit = q.limit.unwrap_or(crate::constants::DEFAULT_LOG_SEARCH_LIMIT);
    Json(
        state
            .workspace
            .logs
            .get_logs(
                q.operation_type,
                q.resource_type,
                q.agent_id.as_deref(),
                q.task_id.as_deref(),
                Some(limit),
            )
            .await,
    )
}

#[derive(Debug, Deserialize)]
struct SearchWorkspaceQuery {
    query: String,
    types: Option<String>,
    limit: Option<usize>,
}

async fn search_workspace(
    State(state): State<AppState>,
    Query(q): Query<SearchWorkspaceQuery>,
) -> Json<crate::workspace::WorkspaceSearchResult> {
    let types: Vec<String> = q
        .types
        .map(|t| t.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_else(|| vec!["files".to_string(), "memory".to_string(), "logs".to_string()]);
    let limit = q.limit.unwrap_or(crate::constants::DEFAULT_FILE_SEARCH_LIMIT);
    let result = state
        .workspace
        .search_all(
            &q.query,
            types.iter().any(|t| t == "files"),
            types.iter().any(|t| t == "memory"),
            types.iter().any(|t| t == "logs"),
            limit,
        )
        .await;
    Json(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::descriptor::{AgentFactory, BuildInputFn, EvaluatorFactory, SubAgent};
    use crate::agents::evaluator::DefaultEvaluator;
    use crate::agents::DescriptorManifest;
    use crate::config::AssistantConfig;
    use crate::llm::{EchoLlmClient, LlmClient};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::collections::HashMap;
    use tower::ServiceExt;

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

    async fn test_state() -> AppState {
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
            executions.clone(),
            messages.clone(),
            workspace.clone(),
            registry.clone(),
            llm,
            config,
        ));

        AppState {
            task_stack,
            messages,
            executions,
            workspace,
            registry,
            assistant,
        }
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_task_returns_404_with_json_error_body() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/api/tasks/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_and_fetch_task_round_trips() {
        let app = build_router(test_state().await);
        let body = serde_json::to_vec(&json!({ "description": { "draft_idea": "a heist" } })).unwrap();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tasks/create")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
