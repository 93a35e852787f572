//! Upstream access for dagctl: a resilient Airflow REST client and the data
//! model it decodes.
//!
//! - [`AirflowClient`] performs authenticated calls with bounded retry and
//!   exhaustive pagination.
//! - [`AirflowApi`] is the typed seam the dispatcher programs against.

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use client::AirflowClient;
pub use config::ClientConfig;
pub use error::{AdapterError, Result};
pub use models::{Dag, DagRun, DagSummary, RunState};
pub use reqwest::Method;
pub use traits::AirflowApi;
