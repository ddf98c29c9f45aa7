//! # Ember Core
//!
//! Domain types, traits, and error definitions for the Ember on-device
//! agent. This crate has **no framework dependencies**: it defines the
//! domain model that the memory, tools and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`Model`]: the opaque "generate text" capability
//! - [`ChatTemplate`]: per-model prompt wrapping
//! - [`Tool`]: one invocable capability
//! - [`AdaptiveSource`]: learned corrections and patterns for the prompt
//!
//! Implementations live in their respective crates (or outside the
//! workspace, for models and templates).

pub mod error;
pub mod event;
pub mod memory;
pub mod model;
pub mod template;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ErrorKind, Result};
pub use event::{ExecutionStatus, GovernorEvent, HealthLevel, ProgressCallback};
pub use memory::{AdaptiveSource, MemoryCategory, MemoryEntry};
pub use model::{Generation, GenerationRequest, Model};
pub use template::{ChatMlTemplate, ChatTemplate, Llama3Template};
pub use tool::{Tool, ToolDescriptor, ToolFlags, ToolRegistry, ToolResult};
