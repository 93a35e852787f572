//! Query interpretation and action dispatch for dagctl.
//!
//! This crate provides:
//!
//! - **Interpretation**: ordered keyword rules and an entity extractor
//!   cascade via [`interpreter::QueryInterpreter`].
//! - **Actions**: the typed action set and the tool catalog via
//!   [`action::Action`] and [`action::tool_catalog`].
//! - **Dispatch**: execution against any [`dagctl_adapters::AirflowApi`]
//!   via [`dispatcher::Dispatcher`], always ending in an
//!   [`envelope::ActionResult`].

pub mod action;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod interpreter;

pub use action::{Action, ToolDefinition, tool_catalog};
pub use dispatcher::{Dispatcher, PauseReport};
pub use envelope::ActionResult;
pub use error::{IntentError, Result, SUPPORTED_ACTIONS};
pub use interpreter::{ExtractorKind, Intent, Interpretation, QueryInterpreter};
