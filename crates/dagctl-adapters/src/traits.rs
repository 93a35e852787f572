//! The typed upstream interface consumed by the dispatcher.
//!
//! [`AirflowApi`] names the five orchestration operations plus a health
//! check.  [`AirflowClient`] implements it over the REST endpoints; tests
//! substitute an in-memory fake.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};

use crate::client::AirflowClient;
use crate::error::Result;
use crate::models::{Dag, DagRun, DagRunCollection};

/// Upstream operations needed to execute every orchestration action.
#[async_trait]
pub trait AirflowApi: Send + Sync {
    /// Every DAG, paginated exhaustively, in upstream order.
    async fn list_dags(&self) -> Result<Vec<Dag>>;

    /// A single DAG by id.
    async fn get_dag(&self, dag_id: &str) -> Result<Dag>;

    /// Write the paused flag.  The response is deliberately not returned:
    /// callers re-read state instead of trusting the write.
    async fn set_paused(&self, dag_id: &str, paused: bool) -> Result<()>;

    /// Submit a new run with the given configuration object.
    async fn trigger_run(&self, dag_id: &str, conf: Value) -> Result<DagRun>;

    /// The most recent run by execution date, if any exist.
    async fn latest_run(&self, dag_id: &str) -> Result<Option<DagRun>>;

    /// Single-attempt upstream health check.
    async fn health(&self) -> Result<Value>;
}

#[async_trait]
impl AirflowApi for AirflowClient {
    async fn list_dags(&self) -> Result<Vec<Dag>> {
        self.fetch_all("/dags", "dags").await
    }

    async fn get_dag(&self, dag_id: &str) -> Result<Dag> {
        let mut data = self
            .call(Method::GET, &format!("/dags/{dag_id}"), &[], None)
            .await?;
        // Some gateways wrap the object as `{"dag": {...}}`.
        let wrapped = data.get_mut("dag").map(Value::take);
        let dag = match wrapped {
            Some(inner @ Value::Object(_)) => inner,
            _ => data,
        };
        Ok(serde_json::from_value(dag)?)
    }

    async fn set_paused(&self, dag_id: &str, paused: bool) -> Result<()> {
        let body = json!({ "is_paused": paused });
        self.call(Method::PATCH, &format!("/dags/{dag_id}"), &[], Some(&body))
            .await?;
        Ok(())
    }

    async fn trigger_run(&self, dag_id: &str, conf: Value) -> Result<DagRun> {
        let body = json!({ "conf": conf });
        let data = self
            .call(
                Method::POST,
                &format!("/dags/{dag_id}/dagRuns"),
                &[],
                Some(&body),
            )
            .await?;
        Ok(serde_json::from_value(data)?)
    }

    async fn latest_run(&self, dag_id: &str) -> Result<Option<DagRun>> {
        let params = [
            ("limit", "1".to_string()),
            ("order_by", "-execution_date".to_string()),
        ];
        let data = self
            .call(
                Method::GET,
                &format!("/dags/{dag_id}/dagRuns"),
                &params,
                None,
            )
            .await?;
        let runs: DagRunCollection = serde_json::from_value(data)?;
        Ok(runs.dag_runs.into_iter().next())
    }

    async fn health(&self) -> Result<Value> {
        self.call_once(Method::GET, "/health", &[]).await
    }
}
