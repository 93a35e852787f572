//! Typed orchestration actions and the tool catalog.
//!
//! Both front ends end up here: the free-text path builds an [`Action`] from
//! an [`Interpretation`], the tool-call path builds one from a tool name and
//! JSON arguments.  The dispatcher only ever sees [`Action`]s.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{IntentError, Result};
use crate::interpreter::{Intent, Interpretation, QueryInterpreter};

/// One executable orchestration action with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    ListDags,
    SearchDags { query: String },
    DagDetails { dag_id: String },
    Pause { dag_id: String },
    Unpause { dag_id: String },
    Trigger { dag_id: String, conf: Value },
    LatestRun { dag_id: String },
}

impl Action {
    /// Build the action a free-text interpretation asks for.
    ///
    /// # Errors
    ///
    /// [`IntentError::Unclassified`] for [`Intent::Unknown`], and
    /// [`IntentError::MissingEntity`] when the intent needs a DAG id that the
    /// text did not yield.
    pub fn from_interpretation(interp: &Interpretation) -> Result<Self> {
        let dag_id = || interp.entity.clone().ok_or(IntentError::MissingEntity);

        Ok(match interp.intent {
            Intent::List => Self::ListDags,
            Intent::Search => Self::SearchDags {
                query: interp.search_term.clone().unwrap_or_default(),
            },
            Intent::Details => Self::DagDetails { dag_id: dag_id()? },
            Intent::Pause => Self::Pause { dag_id: dag_id()? },
            Intent::Unpause => Self::Unpause { dag_id: dag_id()? },
            Intent::Trigger => Self::Trigger {
                dag_id: dag_id()?,
                conf: Value::Object(Map::new()),
            },
            Intent::LatestRun => Self::LatestRun { dag_id: dag_id()? },
            Intent::Unknown => {
                return Err(IntentError::Unclassified {
                    query: interp.raw_text.clone(),
                });
            }
        })
    }

    /// Build an action from a named tool call.
    ///
    /// `arguments` may be `null` for tools without parameters.
    pub fn from_tool_call(
        name: &str,
        arguments: &Value,
        interpreter: &QueryInterpreter,
    ) -> Result<Self> {
        let dag_id = || required_dag_id(name, arguments, interpreter);

        Ok(match name {
            "list_all_dags" => Self::ListDags,
            "search_dags" => Self::SearchDags {
                query: required_str(name, arguments, "query")?.to_string(),
            },
            "get_dag_details" => Self::DagDetails { dag_id: dag_id()? },
            "pause_dag" => Self::Pause { dag_id: dag_id()? },
            "unpause_dag" => Self::Unpause { dag_id: dag_id()? },
            "trigger_dag" => Self::Trigger {
                dag_id: dag_id()?,
                conf: optional_conf(name, arguments)?,
            },
            "get_latest_run" => Self::LatestRun { dag_id: dag_id()? },
            other => {
                return Err(IntentError::UnknownTool {
                    name: other.to_string(),
                });
            }
        })
    }

    /// The intent this action executes.
    pub fn intent(&self) -> Intent {
        match self {
            Self::ListDags => Intent::List,
            Self::SearchDags { .. } => Intent::Search,
            Self::DagDetails { .. } => Intent::Details,
            Self::Pause { .. } => Intent::Pause,
            Self::Unpause { .. } => Intent::Unpause,
            Self::Trigger { .. } => Intent::Trigger,
            Self::LatestRun { .. } => Intent::LatestRun,
        }
    }

    /// The DAG id this action targets, if any.
    pub fn dag_id(&self) -> Option<&str> {
        match self {
            Self::ListDags | Self::SearchDags { .. } => None,
            Self::DagDetails { dag_id }
            | Self::Pause { dag_id }
            | Self::Unpause { dag_id }
            | Self::Trigger { dag_id, .. }
            | Self::LatestRun { dag_id } => Some(dag_id),
        }
    }
}

fn required_str<'a>(tool: &str, arguments: &'a Value, field: &str) -> Result<&'a str> {
    match arguments.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim()),
        Some(Value::String(_)) => Err(IntentError::InvalidArguments {
            tool: tool.to_string(),
            reason: format!("`{field}` must not be empty"),
        }),
        Some(_) => Err(IntentError::InvalidArguments {
            tool: tool.to_string(),
            reason: format!("`{field}` must be a string"),
        }),
        None => Err(IntentError::InvalidArguments {
            tool: tool.to_string(),
            reason: format!("missing required field `{field}`"),
        }),
    }
}

fn required_dag_id(tool: &str, arguments: &Value, interpreter: &QueryInterpreter) -> Result<String> {
    let dag_id = required_str(tool, arguments, "dag_id")?;
    if !interpreter.is_valid_dag_id(dag_id) {
        return Err(IntentError::InvalidArguments {
            tool: tool.to_string(),
            reason: format!("`{dag_id}` is not a valid DAG id"),
        });
    }
    Ok(dag_id.to_string())
}

fn optional_conf(tool: &str, arguments: &Value) -> Result<Value> {
    match arguments.get("conf") {
        None | Some(Value::Null) => Ok(Value::Object(Map::new())),
        Some(conf @ Value::Object(_)) => Ok(conf.clone()),
        Some(_) => Err(IntentError::InvalidArguments {
            tool: tool.to_string(),
            reason: "`conf` must be an object".into(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tool catalog
// ---------------------------------------------------------------------------

/// A tool exposed on the tool-invocation surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Machine-readable tool name (e.g. `pause_dag`).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema describing the tool's input parameters.
    pub parameters: Value,
}

impl ToolDefinition {
    fn new(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

fn dag_id_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "dag_id": { "type": "string", "description": "The DAG identifier" }
        },
        "required": ["dag_id"]
    })
}

/// Every tool, in a stable order.
pub fn tool_catalog() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            "list_all_dags",
            "List ALL DAGs (full pagination)",
            json!({ "type": "object", "properties": {} }),
        ),
        ToolDefinition::new(
            "search_dags",
            "Search DAGs by name (case-insensitive substring)",
            json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            }),
        ),
        ToolDefinition::new("get_dag_details", "Get DAG details", dag_id_schema()),
        ToolDefinition::new("pause_dag", "Pause a DAG and report before/after state", dag_id_schema()),
        ToolDefinition::new(
            "unpause_dag",
            "Unpause a DAG and report before/after state",
            dag_id_schema(),
        ),
        ToolDefinition::new(
            "trigger_dag",
            "Trigger a new DAG run",
            json!({
                "type": "object",
                "properties": {
                    "dag_id": { "type": "string", "description": "The DAG identifier" },
                    "conf": { "type": "object", "description": "Run configuration" }
                },
                "required": ["dag_id"]
            }),
        ),
        ToolDefinition::new("get_latest_run", "Get the latest run of a DAG", dag_id_schema()),
    ]
}
