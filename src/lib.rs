//! # Spiral Forge
//!
//! Spiral Forge is the backend for an agentic content-production pipeline:
//! a layered, pointer-driven task stack; descriptor-driven sub-agent
//! discovery and dispatch; and a workspace persistence layer (numbered
//! files, a bounded memory blob, and an append-only operation log).
//!
//! ## Architecture
//!
//! - **Task stack**: `task_stack::TaskStackStore` holds tasks and layers
//!   behind an execution pointer that partitions history from the future.
//! - **Assistant orchestration**: `agents` (descriptor protocol, registry,
//!   evaluator contract, keyframe materialization) plus `assistant` (input
//!   packaging, execution bookkeeping) and `director` (the poll/plan/
//!   delegate/reflect loop).
//! - **Workspace**: `workspace` composes a numbered `FileManager`, a
//!   bounded `MemoryManager`, and a JSONL `LogManager`.
//!
//! ## Usage
//!
//! Runs as a standalone HTTP service (`api::build_router`) alongside a
//! background `Director` loop; see `main.rs`.

/// Agent discovery, descriptor protocol, evaluator contract, and the
/// keyframe materialization runtime.
pub mod agents;
/// HTTP API server and endpoints.
pub mod api;
/// Assistant orchestration: input packaging, execution lifecycle.
pub mod assistant;
/// System configuration.
pub mod config;
/// System-wide constants.
pub mod constants;
/// The poll/plan/delegate/reflect loop.
pub mod director;
/// Error types and handling.
pub mod error;
/// Execution bookkeeping store.
pub mod execution;
/// Narrow adapter trait for the out-of-scope LLM backend.
pub mod llm;
/// Narrow adapter trait for the out-of-scope media generation backend.
pub mod media;
/// User/director/subagent message store.
pub mod messages;
/// Core data models.
pub mod models;
/// Layered, pointer-driven task stack engine.
pub mod task_stack;
/// Workspace persistence: files, memory, logs.
pub mod workspace;

pub use error::{Result, SpiralError};
