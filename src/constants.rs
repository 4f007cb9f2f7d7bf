//! System-wide configuration values shared across stores and services.

/// Hard cap on the workspace memory blob, in characters.
pub const MEMORY_MAX_LENGTH: usize = 100_000;

/// Soft-cut threshold for memory truncation: a cut point is accepted if it
/// falls at or after this fraction of `MEMORY_MAX_LENGTH`.
pub const MEMORY_TRUNCATE_SOFT_CUT_RATIO: f64 = 0.9;

/// `is_full` reporting threshold, same ratio as the soft-cut search.
pub const MEMORY_FULL_RATIO: f64 = 0.9;

/// Ceiling on full-layer retry passes in the keyframe materialization
/// runtime (L1/L1.5/L2) before the layer is declared failed.
pub const MAX_LAYER_RETRIES: u32 = 10;

/// Default per-dimension pass threshold for `evaluate_creative`.
pub const CREATIVE_PASS_THRESHOLD: f64 = 0.65;

/// Default `search_files`/`search_logs` result caps when the caller omits one.
pub const DEFAULT_FILE_SEARCH_LIMIT: usize = 10;
pub const DEFAULT_LOG_SEARCH_LIMIT: usize = 50;

/// Chars of memory included in an agent's workspace context, the number of
/// recent logs fetched per agent/task pair, and the per-lookup file limit
/// (by creator, then by task tag, deduped) (§4.6 "build inputs").
pub const CONTEXT_MEMORY_CHARS: usize = 2000;
pub const CONTEXT_RECENT_LOGS: usize = 10;
pub const CONTEXT_RECENT_FILES: usize = 5;

/// Default bind address for the HTTP surface when not overridden by env.
pub const DEFAULT_BACKEND_BASE_URL: &str = "http://localhost:5002";
