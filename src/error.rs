//! The crate-wide error taxonomy.
//!
//! One `thiserror` enum per module boundary, composed into [`EngineError`]
//! via `#[from]`. Errors that can reach an operator (load-time failures and
//! the final per-phase error recorded in an [`crate::result::ExecutionResult`])
//! implement [`miette::Diagnostic`] so they carry actionable `help()` text.

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while loading or validating a workflow document.
#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("could not determine whether input is a legacy AdapterConfig or a Workflow document")]
    #[diagnostic(
        code(hyperfleet::load::format_undetected),
        help("Top-level documents need either `kind: AdapterConfig` or `document.dsl`.")
    )]
    FormatUndetected,

    #[error("failed to parse workflow document: {0}")]
    #[diagnostic(code(hyperfleet::load::parse))]
    Parse(String),

    #[error("workflow document failed validation: {0}")]
    #[diagnostic(code(hyperfleet::load::validation))]
    Validation(String),
}

/// Errors raised while rendering a template string or evaluating a runtime
/// expression.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("failed to parse expression `{source_text}`: {reason}")]
    #[diagnostic(
        code(hyperfleet::expr::parse),
        help("Check the expression against the documented jq subset.")
    )]
    Parse { source_text: String, reason: String },

    #[error("missing key `{key}` while rendering template `{source_text}`")]
    #[diagnostic(
        code(hyperfleet::expr::missing_key),
        help("Templates are strict: every `{{{{ .path }}}}` placeholder must resolve.")
    )]
    MissingKey { source_text: String, key: String },

    #[error("type mismatch evaluating `{source_text}`: {reason}")]
    #[diagnostic(code(hyperfleet::expr::type_mismatch))]
    TypeMismatch { source_text: String, reason: String },
}

/// Errors raised while extracting a parameter.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq)]
pub enum ExtractError {
    #[error("required parameter `{name}` could not be resolved from `{source}`")]
    #[diagnostic(
        code(hyperfleet::extract::missing_required),
        help("Supply a value at `{source}` or mark the parameter optional with a default.")
    )]
    MissingRequired { name: String, source: String },

    #[error("parameter `{name}` could not be coerced to {target_type}: {value}")]
    #[diagnostic(code(hyperfleet::extract::coercion))]
    Coercion {
        name: String,
        target_type: String,
        value: String,
    },
}

/// Errors raised by the HTTP task runner's transport layer.
///
/// Non-2xx responses are not represented here — they are data, not errors,
/// and the caller reads `response.statusCode` itself. This variant set is
/// reserved for transport and cancellation failures.
#[derive(Debug, Error, Diagnostic, Clone)]
pub enum HttpError {
    #[error("http request to {endpoint} failed: {reason}")]
    #[diagnostic(code(hyperfleet::http::transport))]
    Transport { endpoint: String, reason: String },

    #[error("http request to {endpoint} was cancelled")]
    #[diagnostic(code(hyperfleet::http::cancelled))]
    Cancelled { endpoint: String },
}

/// Errors raised by the Kubernetes task runner's transport layer.
///
/// Only [`K8sError::NotFound`] carries a distinguished in-engine meaning
/// (the apply algorithm treats it as "resource absent", not a failure); the
/// rest are collapsed into [`K8sError::Other`] uniformly, per the
/// specification's explicit redesign away from the legacy code's
/// inconsistent wrapping.
#[derive(Debug, Error, Diagnostic, Clone)]
pub enum K8sError {
    #[error("resource {kind}/{name} not found")]
    #[diagnostic(code(hyperfleet::k8s::not_found))]
    NotFound { kind: String, name: String },

    #[error("resource {kind}/{name} already exists")]
    #[diagnostic(code(hyperfleet::k8s::already_exists))]
    AlreadyExists { kind: String, name: String },

    #[error("conflicting update to {kind}/{name}: resourceVersion mismatch")]
    #[diagnostic(
        code(hyperfleet::k8s::conflict),
        help("Two executions raced on the same resource. Wrap this task in `Try` to retry.")
    )]
    Conflict { kind: String, name: String },

    #[error("kubernetes operation on {kind}/{name} failed: {reason}")]
    #[diagnostic(code(hyperfleet::k8s::other))]
    Other {
        kind: String,
        name: String,
        reason: String,
    },
}

/// Errors raised while translating a legacy `AdapterConfig` into the task AST.
#[derive(Debug, Error, Diagnostic, Clone)]
pub enum TranslateError {
    #[error("unsupported condition operator `{operator}` on field `{field}`")]
    #[diagnostic(code(hyperfleet::translate::unsupported_operator))]
    UnsupportedOperator { field: String, operator: String },

    #[error("precondition `{name}` is missing a field expression")]
    #[diagnostic(code(hyperfleet::translate::missing_field))]
    MissingField { name: String },
}

/// The top-level error type propagated by the interpreter and runners.
#[derive(Debug, Error, Diagnostic, Clone)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    K8s(#[from] K8sError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Translate(#[from] TranslateError),

    #[error("task `{name}` is not registered in the task registry")]
    #[diagnostic(
        code(hyperfleet::unknown_task),
        help("Registered built-ins are: {}.", crate::runners::BUILTIN_NAMES.join(", "))
    )]
    UnknownTask { name: String },

    #[error("a CEL expression used an unsupported construct: {detail}")]
    #[diagnostic(
        code(hyperfleet::unsupported_cel),
        help("This engine translates conditions to the jq subset; constructs like `.filter(`, `.map(`, `has(` require a full CEL evaluator this crate does not ship.")
    )]
    UnsupportedCel { detail: String },

    #[error("execution was cancelled")]
    #[diagnostic(code(hyperfleet::cancelled))]
    Cancelled,
}

impl EngineError {
    /// A short, stable identifier for the error variant, used as
    /// `ExecutionResult::error_reason`. Hand-written rather than derived,
    /// matching the small enum-to-string mappings this codebase writes by
    /// hand elsewhere (e.g. `NodeKind`'s `Display`) instead of reaching for
    /// a derive-macro crate.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::Expression(_) => "expression_error",
            EngineError::Extract(_) => "extract_error",
            EngineError::Http(_) => "http_transport_error",
            EngineError::K8s(_) => "k8s_transport_error",
            EngineError::Translate(_) => "translate_error",
            EngineError::UnknownTask { .. } => "unknown_task_error",
            EngineError::UnsupportedCel { .. } => "unsupported_cel_error",
            EngineError::Cancelled => "cancelled_error",
        }
    }
}
