//! Error types for STENCIL operations

use crate::TypeRef;
use thiserror::Error;

/// Configuration errors.
///
/// Raised for malformed structural descriptions (before any generation
/// attempt) and for invalid cache configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "Structural mismatch for {target}: {getters} getters, {setters} setters, {types} property types"
    )]
    StructuralMismatch {
        target: TypeRef,
        getters: usize,
        setters: usize,
        types: usize,
    },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Argument errors on the adapter surface.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("Property count mismatch for {target}: expected {expected} values, got {got}")]
    PropertyCountMismatch {
        target: TypeRef,
        expected: usize,
        got: usize,
    },
}

/// Adapter generation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("Generator failed for {target}: {reason}")]
    Failed { target: TypeRef, reason: String },

    #[error("No generator registered for {target}")]
    Unsupported { target: TypeRef },
}

/// Errors raised by an adapter shell while constructing, reading or writing
/// an instance.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("Instance is not a {expected}")]
    WrongInstance { expected: TypeRef },

    #[error("Unknown property {property} on {target}")]
    UnknownProperty { target: TypeRef, property: String },

    #[error("Type mismatch for {property}: expected {expected}, got {got}")]
    TypeMismatch {
        property: String,
        expected: String,
        got: String,
    },

    #[error("Adapter shell for {target} broke its contract: {reason}")]
    ShellContract { target: TypeRef, reason: String },
}

/// Errors raised while invoking a resolved method or constructor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvokeError {
    #[error("Arity mismatch calling {member}: expected {expected} arguments, got {got}")]
    ArityMismatch {
        member: String,
        expected: usize,
        got: usize,
    },

    #[error("Receiver is not a {expected}")]
    WrongReceiver { expected: TypeRef },

    #[error("Invocation of {member} failed: {reason}")]
    Failed { member: String, reason: String },
}

/// Member introspection failures.
///
/// Never surfaced to callers of the member resolver: every variant is
/// recorded as a missing member.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntrospectError {
    #[error("No member {member} on {target}")]
    NotFound { target: TypeRef, member: String },

    #[error("Member {member} on {target} is not accessible")]
    Inaccessible { target: TypeRef, member: String },

    #[error("Member {member} on {target} is ambiguous")]
    Ambiguous { target: TypeRef, member: String },

    #[error("Introspection failed: {reason}")]
    Other { reason: String },
}

/// Master error type for all STENCIL errors.
#[derive(Debug, Clone, Error)]
pub enum StencilError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Argument error: {0}")]
    Argument(#[from] ArgumentError),

    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Invoke error: {0}")]
    Invoke(#[from] InvokeError),
}

/// Result type alias for STENCIL operations.
pub type StencilResult<T> = Result<T, StencilError>;

// =============================================================================
// TESTS
// =============================================================================
