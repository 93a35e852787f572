//! Action dispatcher: executes actions against the upstream API.
//!
//! The dispatcher does not know which front end called it.  It takes either
//! raw text ([`Dispatcher::run_query`]) or a typed [`Action`]
//! ([`Dispatcher::execute`]) and always returns an [`ActionResult`]; no error
//! escapes past it.
//!
//! Pause and unpause use a read-write-read sequence: capture `was_paused`,
//! write the target flag, then re-read to capture `is_now_paused`.  The write
//! call's own response is ignored.  The three calls are not atomic; another
//! writer can change the flag between them, and the report then reflects
//! what each read saw rather than a single transition.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use dagctl_adapters::{AirflowApi, DagSummary, RunState};

use crate::action::Action;
use crate::envelope::ActionResult;
use crate::error::Result;
use crate::interpreter::QueryInterpreter;

// ---------------------------------------------------------------------------
// Output payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ListOutput {
    pub dags: Vec<DagSummary>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub dag_id: String,
    pub is_paused: bool,
}

#[derive(Debug, Serialize)]
pub struct SearchOutput {
    pub query: String,
    pub matches: usize,
    pub dags: Vec<SearchHit>,
}

/// Before/after report of a pause or unpause.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PauseReport {
    pub action: &'static str,
    pub dag_id: String,
    pub was_paused: bool,
    pub is_now_paused: bool,
    /// Whether the two reads differ.
    pub changed: bool,
    pub message: String,
}

impl PauseReport {
    fn new(dag_id: &str, target_paused: bool, was_paused: bool, is_now_paused: bool) -> Self {
        let (action, target_word) = if target_paused {
            ("pause", "paused")
        } else {
            ("unpause", "active")
        };

        let message = if is_now_paused != target_paused {
            format!("DAG '{dag_id}' did not reach the requested state")
        } else if was_paused == target_paused {
            format!("DAG '{dag_id}' was already {target_word}")
        } else {
            format!("DAG '{dag_id}' is now {target_word}")
        };

        Self {
            action,
            dag_id: dag_id.to_string(),
            was_paused,
            is_now_paused,
            changed: was_paused != is_now_paused,
            message,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TriggerOutput {
    pub action: &'static str,
    pub dag_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dag_run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<RunState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_date: Option<DateTime<Utc>>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct LatestRunOutput {
    pub dag_id: String,
    pub dag_run_id: Option<String>,
    pub state: Option<RunState>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub execution_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct NoRunsOutput {
    pub dag_id: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Maps actions onto upstream calls and shapes their results.
pub struct Dispatcher {
    api: Arc<dyn AirflowApi>,
    interpreter: QueryInterpreter,
}

impl Dispatcher {
    /// Create a dispatcher over `api` with a freshly compiled interpreter.
    pub fn new(api: Arc<dyn AirflowApi>) -> Result<Self> {
        Ok(Self::with_interpreter(api, QueryInterpreter::new()?))
    }

    pub fn with_interpreter(api: Arc<dyn AirflowApi>, interpreter: QueryInterpreter) -> Self {
        Self { api, interpreter }
    }

    pub fn interpreter(&self) -> &QueryInterpreter {
        &self.interpreter
    }

    pub fn api(&self) -> &Arc<dyn AirflowApi> {
        &self.api
    }

    /// Interpret free text and execute the resulting action.
    pub async fn run_query(&self, text: &str) -> ActionResult {
        let interpretation = self.interpreter.interpret(text);
        match Action::from_interpretation(&interpretation) {
            Ok(action) => self.execute(action).await,
            Err(e) => {
                debug!(text, intent = %interpretation.intent, error = %e, "query not actionable");
                ActionResult::from(e)
            }
        }
    }

    /// Execute a named tool call.
    pub async fn call_tool(&self, name: &str, arguments: &Value) -> ActionResult {
        match Action::from_tool_call(name, arguments, &self.interpreter) {
            Ok(action) => self.execute(action).await,
            Err(e) => ActionResult::from(e),
        }
    }

    /// Execute a typed action.
    pub async fn execute(&self, action: Action) -> ActionResult {
        let intent = action.intent();
        let dag_id = action.dag_id().map(str::to_owned);

        match self.try_execute(action).await {
            Ok(output) => {
                debug!(intent = %intent, dag_id = ?dag_id, "action succeeded");
                ActionResult::Success(output)
            }
            Err(e) => {
                warn!(intent = %intent, dag_id = ?dag_id, error = %e, "action failed");
                ActionResult::from(e)
            }
        }
    }

    async fn try_execute(&self, action: Action) -> Result<Value> {
        let output = match action {
            Action::ListDags => serde_json::to_value(self.list().await?)?,
            Action::SearchDags { query } => serde_json::to_value(self.search(query).await?)?,
            Action::DagDetails { dag_id } => {
                let dag = self.api.get_dag(&dag_id).await?;
                serde_json::to_value(DagSummary::from(&dag))?
            }
            Action::Pause { dag_id } => serde_json::to_value(self.set_paused(&dag_id, true).await?)?,
            Action::Unpause { dag_id } => {
                serde_json::to_value(self.set_paused(&dag_id, false).await?)?
            }
            Action::Trigger { dag_id, conf } => {
                let run = self.api.trigger_run(&dag_id, conf).await?;
                info!(dag_id = %dag_id, dag_run_id = ?run.dag_run_id, "triggered DAG run");
                serde_json::to_value(TriggerOutput {
                    action: "trigger",
                    message: format!("Triggered DAG '{dag_id}'"),
                    dag_id,
                    dag_run_id: run.dag_run_id,
                    state: run.state,
                    execution_date: run.execution_date,
                })?
            }
            Action::LatestRun { dag_id } => match self.api.latest_run(&dag_id).await? {
                Some(run) => serde_json::to_value(LatestRunOutput {
                    dag_id,
                    dag_run_id: run.dag_run_id,
                    state: run.state,
                    start_date: run.start_date,
                    end_date: run.end_date,
                    execution_date: run.execution_date,
                })?,
                None => serde_json::to_value(NoRunsOutput {
                    message: format!("No runs found for DAG '{dag_id}'"),
                    dag_id,
                })?,
            },
        };
        Ok(output)
    }

    async fn list(&self) -> Result<ListOutput> {
        let dags = self.api.list_dags().await?;
        let dags: Vec<DagSummary> = dags.iter().map(DagSummary::from).collect();
        Ok(ListOutput {
            count: dags.len(),
            dags,
        })
    }

    async fn search(&self, query: String) -> Result<SearchOutput> {
        let needle = query.to_lowercase();
        let dags: Vec<SearchHit> = self
            .api
            .list_dags()
            .await?
            .into_iter()
            .filter(|dag| dag.dag_id.to_lowercase().contains(&needle))
            .map(|dag| SearchHit {
                dag_id: dag.dag_id,
                is_paused: dag.is_paused,
            })
            .collect();
        Ok(SearchOutput {
            query,
            matches: dags.len(),
            dags,
        })
    }

    /// Read, write, re-read.  The reported outcome comes from the reads only.
    async fn set_paused(&self, dag_id: &str, target: bool) -> Result<PauseReport> {
        let was_paused = self.api.get_dag(dag_id).await?.is_paused;
        self.api.set_paused(dag_id, target).await?;
        let is_now_paused = self.api.get_dag(dag_id).await?.is_paused;

        let report = PauseReport::new(dag_id, target, was_paused, is_now_paused);
        info!(
            dag_id,
            was_paused,
            is_now_paused,
            changed = report.changed,
            "pause state verified"
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use dagctl_adapters::{AdapterError, Dag, DagRun};
    use serde_json::json;

    use super::*;

    /// How the fake reacts to a pause write.
    #[derive(Clone, Copy, PartialEq)]
    enum WriteBehavior {
        Apply,
        /// Accept the write but leave state unchanged.
        Ignore,
        /// Another actor flips the flag right after our write.
        Clobber,
    }

    struct FakeAirflow {
        dags: Mutex<Vec<Dag>>,
        runs: HashMap<String, Vec<DagRun>>,
        write_behavior: WriteBehavior,
        fail_everything: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeAirflow {
        fn new(dags: &[(&str, bool)]) -> Self {
            Self {
                dags: Mutex::new(
                    dags.iter()
                        .map(|(id, paused)| dag(id, *paused))
                        .collect(),
                ),
                runs: HashMap::new(),
                write_behavior: WriteBehavior::Apply,
                fail_everything: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: String) -> dagctl_adapters::Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail_everything {
                return Err(AdapterError::RetriesExhausted {
                    attempts: 3,
                    last: "connection refused".into(),
                });
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn dag(id: &str, paused: bool) -> Dag {
        serde_json::from_value(json!({
            "dag_id": id,
            "is_paused": paused,
            "schedule_interval": "@daily",
            "owners": ["data"],
            "tags": [{ "name": "etl" }]
        }))
        .unwrap()
    }

    #[async_trait]
    impl AirflowApi for FakeAirflow {
        async fn list_dags(&self) -> dagctl_adapters::Result<Vec<Dag>> {
            self.record("list".into())?;
            Ok(self.dags.lock().unwrap().clone())
        }

        async fn get_dag(&self, dag_id: &str) -> dagctl_adapters::Result<Dag> {
            self.record(format!("get {dag_id}"))?;
            self.dags
                .lock()
                .unwrap()
                .iter()
                .find(|d| d.dag_id == dag_id)
                .cloned()
                .ok_or_else(|| AdapterError::RetriesExhausted {
                    attempts: 3,
                    last: format!("404 DAG {dag_id} not found"),
                })
        }

        async fn set_paused(&self, dag_id: &str, paused: bool) -> dagctl_adapters::Result<()> {
            self.record(format!("patch {dag_id} {paused}"))?;
            let mut dags = self.dags.lock().unwrap();
            if let Some(d) = dags.iter_mut().find(|d| d.dag_id == dag_id) {
                match self.write_behavior {
                    WriteBehavior::Apply => d.is_paused = paused,
                    WriteBehavior::Ignore => {}
                    WriteBehavior::Clobber => d.is_paused = !paused,
                }
            }
            Ok(())
        }

        async fn trigger_run(&self, dag_id: &str, conf: Value) -> dagctl_adapters::Result<DagRun> {
            self.record(format!("trigger {dag_id} {conf}"))?;
            if dag_id == "terse_dag" {
                return Ok(serde_json::from_value(json!({
                    "state": "queued",
                    "execution_date": "2024-05-02T12:00:00"
                }))?);
            }
            Ok(serde_json::from_value(json!({
                "dag_run_id": "manual__2024-05-02T12:00:00",
                "state": "queued",
                "execution_date": "2024-05-02T12:00:00+00:00"
            }))?)
        }

        async fn latest_run(&self, dag_id: &str) -> dagctl_adapters::Result<Option<DagRun>> {
            self.record(format!("runs {dag_id}"))?;
            Ok(self.runs.get(dag_id).and_then(|r| r.first().cloned()))
        }

        async fn health(&self) -> dagctl_adapters::Result<Value> {
            Ok(json!({ "metadatabase": { "status": "healthy" } }))
        }
    }

    fn dispatcher(fake: FakeAirflow) -> (Dispatcher, Arc<FakeAirflow>) {
        let fake = Arc::new(fake);
        let api: Arc<dyn AirflowApi> = fake.clone();
        (Dispatcher::new(api).unwrap(), fake)
    }

    // -- list / search / details ---------------------------------------------

    #[tokio::test]
    async fn list_returns_all_with_count() {
        let (d, _) = dispatcher(FakeAirflow::new(&[("etl_daily", false), ("reporting", true)]));
        let result = d.run_query("list all dags").await;
        let output = result.output().expect("success");
        assert_eq!(output["count"], 2);
        assert_eq!(output["dags"][0]["dag_id"], "etl_daily");
        assert_eq!(output["dags"][1]["is_paused"], true);
        assert_eq!(output["dags"][0]["tags"], json!(["etl"]));
        assert_eq!(output["dags"][0]["schedule_interval"], "@daily");
    }

    #[tokio::test]
    async fn search_filters_case_insensitively() {
        let (d, _) = dispatcher(FakeAirflow::new(&[
            ("ETL_daily", false),
            ("etl_weekly", true),
            ("reporting", false),
        ]));
        let result = d.run_query("search for etl").await;
        let output = result.output().expect("success");
        assert_eq!(output["query"], "etl");
        assert_eq!(output["matches"], 2);
        assert_eq!(output["dags"][0]["dag_id"], "ETL_daily");
        assert_eq!(output["dags"][1]["is_paused"], true);
    }

    #[tokio::test]
    async fn search_with_no_matches_is_success() {
        let (d, _) = dispatcher(FakeAirflow::new(&[("reporting", false)]));
        let result = d.run_query("search for billing").await;
        assert!(result.is_success());
        assert_eq!(result.output().unwrap()["matches"], 0);
        assert_eq!(result.output().unwrap()["dags"], json!([]));
    }

    #[tokio::test]
    async fn details_returns_summary() {
        let (d, _) = dispatcher(FakeAirflow::new(&[("etl_daily", true)]));
        let result = d.run_query("details of etl_daily").await;
        let output = result.output().expect("success");
        assert_eq!(output["dag_id"], "etl_daily");
        assert_eq!(output["is_paused"], true);
        assert_eq!(output["is_active"], true);
    }

    #[tokio::test]
    async fn details_without_entity_fails_fast() {
        let (d, fake) = dispatcher(FakeAirflow::new(&[]));
        let result = d.run_query("show details").await;
        assert_eq!(result.error(), Some("Could not extract DAG ID from query"));
        assert!(fake.calls().is_empty(), "no upstream call expected");
    }

    // -- pause / unpause -----------------------------------------------------

    #[tokio::test]
    async fn pause_already_paused_reports_no_change() {
        let (d, fake) = dispatcher(FakeAirflow::new(&[("etl_daily", true)]));
        let result = d.run_query("pause etl_daily").await;
        let output = result.output().expect("success");
        assert_eq!(output["was_paused"], true);
        assert_eq!(output["is_now_paused"], true);
        assert_eq!(output["changed"], false);
        assert_eq!(output["message"], "DAG 'etl_daily' was already paused");
        assert_eq!(
            fake.calls(),
            vec!["get etl_daily", "patch etl_daily true", "get etl_daily"]
        );
    }

    #[tokio::test]
    async fn pause_active_dag_changes_state() {
        let (d, _) = dispatcher(FakeAirflow::new(&[("etl_daily", false)]));
        let result = d.run_query("pause etl_daily").await;
        let output = result.output().expect("success");
        assert_eq!(output["action"], "pause");
        assert_eq!(output["was_paused"], false);
        assert_eq!(output["is_now_paused"], true);
        assert_eq!(output["changed"], true);
        assert_eq!(output["message"], "DAG 'etl_daily' is now paused");
    }

    #[tokio::test]
    async fn unpause_paused_dag() {
        let (d, _) = dispatcher(FakeAirflow::new(&[("etl_daily", true)]));
        let result = d.run_query("resume etl_daily").await;
        let output = result.output().expect("success");
        assert_eq!(output["action"], "unpause");
        assert_eq!(output["was_paused"], true);
        assert_eq!(output["is_now_paused"], false);
        assert_eq!(output["message"], "DAG 'etl_daily' is now active");
    }

    #[tokio::test]
    async fn unpause_already_active() {
        let (d, _) = dispatcher(FakeAirflow::new(&[("etl_daily", false)]));
        let result = d.run_query("unpause etl_daily").await;
        assert_eq!(
            result.output().unwrap()["message"],
            "DAG 'etl_daily' was already active"
        );
    }

    #[tokio::test]
    async fn pause_report_comes_from_reread_not_write() {
        let mut fake = FakeAirflow::new(&[("etl_daily", false)]);
        fake.write_behavior = WriteBehavior::Ignore;
        let (d, _) = dispatcher(fake);
        let result = d.run_query("pause etl_daily").await;
        let output = result.output().expect("success");
        assert_eq!(output["was_paused"], false);
        assert_eq!(output["is_now_paused"], false);
        assert_eq!(
            output["message"],
            "DAG 'etl_daily' did not reach the requested state"
        );
    }

    #[tokio::test]
    async fn concurrent_writer_shows_in_report() {
        let mut fake = FakeAirflow::new(&[("etl_daily", true)]);
        fake.write_behavior = WriteBehavior::Clobber;
        let (d, _) = dispatcher(fake);
        let result = d.run_query("pause etl_daily").await;
        let output = result.output().expect("success");
        // The second read saw the other writer's value.
        assert_eq!(output["was_paused"], true);
        assert_eq!(output["is_now_paused"], false);
        assert_eq!(output["changed"], true);
    }

    // -- trigger / latest run ------------------------------------------------

    #[tokio::test]
    async fn trigger_returns_new_run() {
        let (d, fake) = dispatcher(FakeAirflow::new(&[("etl_daily", false)]));
        let result = d.run_query("trigger etl_daily").await;
        let output = result.output().expect("success");
        assert_eq!(output["dag_run_id"], "manual__2024-05-02T12:00:00");
        assert_eq!(output["state"], "queued");
        assert!(output["execution_date"].is_string());
        assert_eq!(fake.calls(), vec!["trigger etl_daily {}"]);
    }

    #[tokio::test]
    async fn trigger_with_partial_response_is_success() {
        let (d, fake) = dispatcher(FakeAirflow::new(&[("terse_dag", false)]));
        let result = d.run_query("trigger terse_dag").await;
        let output = result.output().expect("success");
        assert!(output.get("dag_run_id").is_none());
        assert_eq!(output["state"], "queued");
        assert_eq!(output["execution_date"], "2024-05-02T12:00:00Z");
        assert_eq!(output["message"], "Triggered DAG 'terse_dag'");
        assert_eq!(fake.calls(), vec!["trigger terse_dag {}"]);
    }

    #[tokio::test]
    async fn trigger_tool_passes_conf() {
        let (d, fake) = dispatcher(FakeAirflow::new(&[("etl_daily", false)]));
        let result = d
            .call_tool(
                "trigger_dag",
                &json!({ "dag_id": "etl_daily", "conf": { "full": true } }),
            )
            .await;
        assert!(result.is_success());
        assert_eq!(fake.calls(), vec![r#"trigger etl_daily {"full":true}"#]);
    }

    #[tokio::test]
    async fn latest_run_with_zero_runs_is_success() {
        let (d, _) = dispatcher(FakeAirflow::new(&[("etl_daily", false)]));
        let result = d.run_query("latest run for etl_daily").await;
        assert!(result.is_success());
        assert_eq!(
            result.output().unwrap()["message"],
            "No runs found for DAG 'etl_daily'"
        );
    }

    #[tokio::test]
    async fn latest_run_reports_run_fields() {
        let mut fake = FakeAirflow::new(&[("etl_daily", false)]);
        fake.runs.insert(
            "etl_daily".into(),
            vec![
                serde_json::from_value(json!({
                    "dag_run_id": "scheduled__2024-05-01",
                    "state": "upstream_failed",
                    "start_date": "2024-05-01T00:00:05+00:00",
                    "end_date": null,
                    "execution_date": "2024-05-01T00:00:00+00:00"
                }))
                .unwrap(),
            ],
        );
        let (d, _) = dispatcher(fake);
        let result = d.run_query("last run of etl_daily").await;
        let output = result.output().expect("success");
        assert_eq!(output["dag_run_id"], "scheduled__2024-05-01");
        assert_eq!(output["state"], "upstream_failed");
        assert!(output["end_date"].is_null());
    }

    // -- failures ------------------------------------------------------------

    #[tokio::test]
    async fn unknown_intent_lists_supported_actions() {
        let (d, _) = dispatcher(FakeAirflow::new(&[]));
        let result = d.run_query("what is the weather").await;
        assert!(!result.is_success());
        let error = result.error().unwrap();
        assert!(error.contains("Could not understand query: 'what is the weather'"));
        assert!(error.ends_with(crate::error::SUPPORTED_ACTIONS));
    }

    #[tokio::test]
    async fn upstream_failure_becomes_failure_envelope() {
        let mut fake = FakeAirflow::new(&[("etl_daily", false)]);
        fake.fail_everything = true;
        let (d, _) = dispatcher(fake);
        let result = d.run_query("pause etl_daily").await;
        assert_eq!(result.error(), Some("Airflow error: connection refused"));
    }

    #[tokio::test]
    async fn failure_does_not_poison_next_query() {
        let (d, _) = dispatcher(FakeAirflow::new(&[("etl_daily", false)]));
        assert!(!d.run_query("details of missing_dag").await.is_success());
        assert!(d.run_query("details of etl_daily").await.is_success());
    }

    #[tokio::test]
    async fn unknown_tool_is_failure() {
        let (d, _) = dispatcher(FakeAirflow::new(&[]));
        let result = d.call_tool("drop_dag", &json!({})).await;
        assert_eq!(result.error(), Some("unknown tool: drop_dag"));
    }

    #[test]
    fn pause_report_messages() {
        assert_eq!(
            PauseReport::new("x", true, false, true).message,
            "DAG 'x' is now paused"
        );
        assert_eq!(
            PauseReport::new("x", false, false, false).message,
            "DAG 'x' was already active"
        );
        assert!(!PauseReport::new("x", false, false, false).changed);
    }
}
