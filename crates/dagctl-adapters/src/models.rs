//! Upstream data model: DAGs and DAG runs as the Airflow REST API returns them.
//!
//! These types are read-through views.  Nothing here is cached; every value is
//! decoded from a response and discarded once the calling action finishes.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// DAG
// ---------------------------------------------------------------------------

/// A workflow definition as reported by `GET /dags` and `GET /dags/{id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Dag {
    pub dag_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_paused: bool,
    #[serde(default = "default_true", deserialize_with = "null_as_true")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "schedule_from_value")]
    pub schedule_interval: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub owners: Vec<String>,
    #[serde(default, deserialize_with = "tags_from_value")]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub fileloc: Option<String>,
}

/// Summary fields exposed by the list and details actions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DagSummary {
    pub dag_id: String,
    pub is_paused: bool,
    pub is_active: bool,
    pub description: Option<String>,
    pub schedule_interval: Option<String>,
    pub owners: Vec<String>,
    pub tags: Vec<String>,
    pub fileloc: Option<String>,
}

impl From<&Dag> for DagSummary {
    fn from(dag: &Dag) -> Self {
        Self {
            dag_id: dag.dag_id.clone(),
            is_paused: dag.is_paused,
            is_active: dag.is_active,
            description: dag.description.clone(),
            schedule_interval: dag.schedule_interval.clone(),
            owners: dag.owners.clone(),
            tags: dag.tags.iter().cloned().collect(),
            fileloc: dag.fileloc.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// DAG runs
// ---------------------------------------------------------------------------

/// State of a DAG run.  Unknown upstream states are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunState {
    Queued,
    Running,
    Success,
    Failed,
    UpstreamFailed,
    Other(String),
}

impl RunState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::UpstreamFailed => "upstream_failed",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for RunState {
    fn from(s: &str) -> Self {
        match s {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "success" => Self::Success,
            "failed" => Self::Failed,
            "upstream_failed" => Self::UpstreamFailed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RunState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RunState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

/// One execution of a DAG.
///
/// Every field is optional: a trigger response that omits the run id or
/// carries an unparseable timestamp still decodes, since the run already
/// exists upstream by the time the body is read.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DagRun {
    #[serde(default)]
    pub dag_run_id: Option<String>,
    #[serde(default)]
    pub state: Option<RunState>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub execution_date: Option<DateTime<Utc>>,
}

/// Response of `GET /dags/{id}/dagRuns`.
#[derive(Debug, Clone, Deserialize)]
pub struct DagRunCollection {
    #[serde(default)]
    pub dag_runs: Vec<DagRun>,
}

// ---------------------------------------------------------------------------
// Lenient field decoders
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_true<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

/// Airflow 2 reports schedules as `{"__type": "CronExpression", "value": "..."}`;
/// older deployments send a bare string.
fn schedule_from_value<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Object(map)) => map.get("value").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    })
}

/// RFC 3339 first, then a naive `YYYY-MM-DDTHH:MM:SS[.f]` read as UTC.
/// Anything else decodes as `None`.
fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let Some(Value::String(raw)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(parse_timestamp(&raw))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn tags_from_value<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeSet<String>, D::Error> {
    let value = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(value
        .into_iter()
        .filter_map(|tag| match tag {
            Value::String(s) => Some(s),
            Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_owned),
            _ => None,
        })
        .collect())
}
