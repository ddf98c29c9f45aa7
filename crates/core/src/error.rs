//! Error types for the Ember domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] wraps them all and
//! [`Error::kind`] maps every variant onto the flat failure taxonomy callers
//! match on.

use thiserror::Error;

/// The top-level error type for all Ember operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Tool registry errors ---
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    // --- Tool execution errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Context window errors ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Model capability errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Argument validation ---
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Flat failure taxonomy shared by every bounded context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    DuplicateName,
    Io,
    Format,
    Eviction,
    Truncation,
    Model,
    Tool,
    Config,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Registry(e) => e.kind(),
            Error::Tool(e) => e.kind(),
            Error::Memory(e) => e.kind(),
            Error::Context(e) => e.kind(),
            Error::Model(_) => ErrorKind::Model,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Config { .. } => ErrorKind::Config,
            Error::Serialization(_) => ErrorKind::Format,
        }
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("Tool already registered: {0}")]
    DuplicateName(String),

    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Prompt exceeds budget: {required} chars needed, {limit} allowed")]
    Truncation { required: usize, limit: usize },
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateName(_) => ErrorKind::DuplicateName,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Truncation { .. } => ErrorKind::Truncation,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool call declined by user: {0}")]
    Denied(String),
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidArguments(_) => ErrorKind::InvalidArgument,
            Self::ExecutionFailed { .. } | Self::Denied(_) => ErrorKind::Tool,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Invalid memory argument: {0}")]
    InvalidArgument(String),

    #[error("Memory entry not found: {0}")]
    NotFound(u64),

    #[error("Storage error: {0}")]
    Io(String),

    #[error("Malformed memory data: {0}")]
    Format(String),
}

impl MemoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Io(_) => ErrorKind::Io,
            Self::Format(_) => ErrorKind::Format,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("Invalid context argument: {0}")]
    InvalidArgument(String),

    #[error("Nothing to evict: {0}")]
    Eviction(String),

    #[error("Summarization failed: {0}")]
    Summarization(#[from] ModelError),

    #[error("Summary could not be stored: {0}")]
    Memory(#[from] MemoryError),
}

impl ContextError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Eviction(_) => ErrorKind::Eviction,
            Self::Summarization(_) => ErrorKind::Model,
            Self::Memory(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Model unavailable: {0}")]
    Unavailable(String),
}
