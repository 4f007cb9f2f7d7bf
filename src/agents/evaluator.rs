use async_trait::async_trait;

use crate::constants::CREATIVE_PASS_THRESHOLD;
use crate::models::Map;

#[derive(Debug, Clone, Default)]
pub struct CreativeEvaluation {
    pub dimensions: std::collections::HashMap<String, f64>,
    pub overall_pass: bool,
    pub summary: String,
}

impl CreativeEvaluation {
    pub fn auto_pass() -> Self {
        Self {
            dimensions: std::collections::HashMap::new(),
            overall_pass: true,
            summary: "no creative dimensions declared; auto-pass".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetEvaluation {
    pub success_count: usize,
    pub error_count: usize,
    pub missing_count: usize,
    pub overall_pass: bool,
    pub summary: String,
}

/// Classifies a materialized URI per spec.md's evaluator contract:
/// `error:`-prefixed URIs are generation failures, empty/absent is missing,
/// anything else counts as a success.
pub fn classify_uri(uri: Option<&str>) -> &'static str {
    match uri {
        None => "missing",
        Some(u) if u.is_empty() => "missing",
        Some(u) if u.starts_with("error:") => "error",
        Some(_) => "success",
    }
}

/// The three quality gates invoked by the agent runtime. Defaults match the
/// "deterministic/free", "skipped if no dimensions", and "post-
/// materialization only" behavior spec.md describes; concrete agents
/// override whichever layers apply to them.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn check_structure(&self, _output: &Map, _upstream: Option<&Map>) -> Vec<String> {
        Vec::new()
    }

    async fn evaluate_creative(&self, _output: &Map, _upstream: Option<&Map>) -> CreativeEvaluation {
        CreativeEvaluation::auto_pass()
    }

    async fn evaluate_asset(&self, asset_data: &Map, _upstream: Option<&Map>) -> AssetEvaluation {
        let uris: Vec<Option<String>> = asset_data
            .values()
            .filter_map(|v| v.get("uri"))
            .map(|v| v.as_str().map(|s| s.to_string()))
            .collect();

        let mut success_count = 0;
        let mut error_count = 0;
        let mut missing_count = 0;
        for uri in &uris {
            match classify_uri(uri.as_deref()) {
                "success" => success_count += 1,
                "error" => error_count += 1,
                _ => missing_count += 1,
            }
        }

        let total = uris.len().max(1);
        let pass_rate = success_count as f64 / total as f64;
        AssetEvaluation {
            success_count,
            error_count,
            missing_count,
            overall_pass: pass_rate >= CREATIVE_PASS_THRESHOLD,
            summary: format!(
                "{success_count}/{total} assets materialized successfully"
            ),
        }
    }
}

/// Pass-through evaluator used by descriptors that declare no quality
/// gates of their own and by tests.
pub struct DefaultEvaluator;

impl Evaluator for DefaultEvaluator {}
