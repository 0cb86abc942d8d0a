//! # Hyperfleet Engine: Declarative Workflow Interpreter
//!
//! This crate implements the workflow **engine** at the heart of an adapter
//! that bridges a message-bus event to a Kubernetes cluster and an external
//! fleet-management HTTP API. For each incoming event it interprets a small
//! task AST: extract parameters, evaluate preconditions over HTTP,
//! reconcile Kubernetes resources, then post results back.
//!
//! ## Core Concepts
//!
//! - [`ast`] — the task AST (`Set`, `Do`, `Try`, `CallHttp`, `CallFunction`)
//! - [`expr`] — the expression substrate: mustache-like templates and a
//!   jq-subset runtime expression language
//! - [`value_map`] — the JSON-shaped state threaded through the interpreter
//! - [`interpreter`] — the tree-walking evaluator
//! - [`runners`] — the built-in task implementations
//! - [`translator`] — converts a legacy `AdapterConfig` into the same AST
//! - [`facade`] — wires a loaded workflow into a single `execute` entry point
//!
//! ## Quick Start
//!
//! ```
//! use hyperfleet_engine::ast::{TaskItem, TaskNode};
//! use hyperfleet_engine::expr::Expr;
//! use rustc_hash::FxHashMap;
//!
//! let mut fields = FxHashMap::default();
//! fields.insert("y".to_string(), Expr::parse("${ .event.id }"));
//!
//! let item = TaskItem::new("a", TaskNode::Set(fields));
//! assert_eq!(item.key, "a");
//! ```
//!
//! ## Module Guide
//!
//! - [`document`] - Workflow document, loader, and format detection
//! - [`ast`] - Task AST node types
//! - [`expr`] - Template and jq-subset expression substrate
//! - [`value_map`] - The value map threaded through execution
//! - [`interpreter`] - The AST interpreter
//! - [`runners`] - Built-in task runner implementations and registry
//! - [`translator`] - Legacy `AdapterConfig` to AST translation
//! - [`context`] - Per-execution context
//! - [`result`] - Execution result and phase bookkeeping
//! - [`facade`] - The `Adapter` entry point
//! - [`http`] - Outbound HTTP transport trait and reqwest-backed impl
//! - [`k8s`] - Kubernetes transport trait and kube-backed impl
//! - [`env`] - Environment variable snapshotting rules
//! - [`error`] - The crate-wide error taxonomy

pub mod ast;
pub mod context;
pub mod document;
pub mod env;
pub mod error;
pub mod expr;
pub mod facade;
pub mod http;
pub mod interpreter;
pub mod k8s;
pub mod result;
pub mod runners;
pub mod translator;
pub mod value_map;

pub use error::EngineError;
pub use facade::Adapter;
pub use result::ExecutionResult;
