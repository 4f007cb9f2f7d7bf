use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use spiral_forge::agents::AgentRegistry;
use spiral_forge::api::{build_router, AppState};
use spiral_forge::assistant::AssistantService;
use spiral_forge::config::Config;
use spiral_forge::director::{Director, DirectorPolicy, NextTaskPolicy};
use spiral_forge::execution::ExecutionStore;
use spiral_forge::llm::{EchoLlmClient, LlmClient};
use spiral_forge::messages::MessageStore;
use spiral_forge::task_stack::TaskStackStore;
use spiral_forge::workspace::Workspace;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fatal: failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.server.log_level))
        .init();

    info!("starting spiral-forge on {}:{}", config.server.host, config.server.port);

    let task_stack = Arc::new(TaskStackStore::new());
    let executions = Arc::new(ExecutionStore::new());
    let messages = Arc::new(MessageStore::new());
    let workspace = Arc::new(
        Workspace::new(
            config.workspace.default_workspace_id.clone(),
            &config.workspace.runtime_base_path,
        )
        .await?,
    );
    let registry = Arc::new(AgentRegistry::new());

    // No pipeline agents are registered by default: descriptor authoring is
    // out of scope for this backend (spec.md §1). Production deployments
    // call `registry.register_pipeline_agents(...)` before serving traffic.

    let llm: Arc<dyn LlmClient> = Arc::new(EchoLlmClient);

    let assistant = Arc::new(AssistantService::new(
        task_stack.clone(),
        executions.clone(),
        messages.clone(),
        workspace.clone(),
        registry.clone(),
        llm,
        config.assistant.clone(),
    ));

    let state = AppState {
        task_stack: task_stack.clone(),
        messages: messages.clone(),
        executions,
        workspace,
        registry,
        assistant: assistant.clone(),
    };

    let app = build_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let policy: Arc<dyn DirectorPolicy> = Arc::new(NextTaskPolicy);
    let director = Director::new(task_stack, messages, assistant, policy);
    let polling_interval = std::time::Duration::from_secs_f64(config.assistant.polling_interval_secs);

    let director_loop = async move {
        let mut shutdown = Box::pin(shutdown_signal());
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(polling_interval) => {
                    if let Err(e) = director.tick().await {
                        error!("director tick failed: {e}");
                    }
                }
            }
        }
    };

    tokio::select! {
        result = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()) => {
            if let Err(e) = result {
                error!("http server failed: {e}");
            }
        }
        _ = director_loop => {
            info!("director loop stopped");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
