use async_trait::async_trait;

use crate::Result;

/// Narrow interface to the out-of-scope LLM backend. Sub-agents and
/// evaluators call through this trait only; no call site depends on a
/// concrete provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Deterministic test double: echoes a short fingerprint of the prompt
/// instead of calling out. Used by default in tests and as the process
/// default until a real adapter is wired in `main.rs`.
pub struct EchoLlmClient;

#[async_trait]
impl LlmClient for EchoLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        Ok(format!("echo:{}", prompt.chars().take(64).collect::<String>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_client_returns_fingerprint() {
        let client = EchoLlmClient;
        let out = client.complete("draft a scene").await.unwrap();
        assert!(out.starts_with("echo:"));
    }
}
