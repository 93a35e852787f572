//! Query interpreter: turns raw text into an intent and a DAG id.
//!
//! Two independent cascades run over the same text:
//!
//! 1. **Intent rules**: an ordered list of `(pattern, intent)` pairs matched
//!    against the lower-cased text.  The first rule that matches decides the
//!    intent; later rules are not consulted.
//! 2. **Entity extractors**: an ordered list of strategies, each yielding at
//!    most one candidate id.  A candidate in the stopword set is discarded
//!    and the next strategy runs; the first surviving candidate wins.
//!
//! Both cascades are pure functions of the text.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IntentError, Result};

/// Words that look like ids to the extractors but never name a DAG.
const STOPWORDS: &[&str] = &["all", "dags", "dag", "list", "show", "get"];

/// Characters allowed in a DAG id.
const ID_CHARS: &str = r"[A-Za-z0-9_\-:.]";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The classified action a free-text query maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    List,
    Search,
    Details,
    Pause,
    Unpause,
    Trigger,
    LatestRun,
    Unknown,
}

impl Intent {
    /// Whether executing this intent needs a DAG id.
    pub fn requires_entity(self) -> bool {
        matches!(
            self,
            Self::Details | Self::Pause | Self::Unpause | Self::Trigger | Self::LatestRun
        )
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::List => "list",
            Self::Search => "search",
            Self::Details => "details",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
            Self::Trigger => "trigger",
            Self::LatestRun => "latest_run",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// The extraction strategy that produced an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// `'etl_daily'` or `"etl_daily"`.
    Quoted,
    /// A bare token with at least one `_ - : .` separator.
    Compound,
    /// The token after the word `dag`.
    AfterDag,
    /// The token after `for`, `of`, `on` or `named`.
    AfterPreposition,
}

/// Everything derived from one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    pub raw_text: String,
    pub intent: Intent,
    pub entity: Option<String>,
    /// Which extractor produced `entity`.
    pub extractor: Option<ExtractorKind>,
    /// Search term, only for [`Intent::Search`].
    pub search_term: Option<String>,
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// A compiled `(pattern, intent)` rule.
#[derive(Debug, Clone)]
struct IntentRule {
    intent: Intent,
    pattern: Regex,
}

/// A compiled entity extraction strategy.  Capture group 1 is the candidate.
#[derive(Debug, Clone)]
struct Extractor {
    kind: ExtractorKind,
    pattern: Regex,
}

/// Rules in priority order.  `latest run` is checked ahead of the bare
/// `run` trigger keyword, which would otherwise shadow it.
fn intent_rule_sources() -> Vec<(Intent, String)> {
    vec![
        (Intent::List, r"\b(?:list|show|get)\b.*\bdag".into()),
        (Intent::Search, r"search".into()),
        (Intent::Details, r"\b(?:details?|info|status)\b".into()),
        (Intent::Pause, r"\bpause\b".into()),
        (Intent::Unpause, r"\b(?:unpause|resume|activate|start)\b".into()),
        (Intent::LatestRun, r"\b(?:latest|last|recent)\s+run\b".into()),
        (Intent::Trigger, r"\b(?:trigger|run)\b".into()),
    ]
}

fn extractor_sources() -> Vec<(ExtractorKind, String)> {
    vec![
        (ExtractorKind::Quoted, format!(r#"["']({ID_CHARS}+)["']"#)),
        (
            ExtractorKind::Compound,
            r"\b([A-Za-z0-9_]+(?:[_\-:.][A-Za-z0-9_]+)+)\b".into(),
        ),
        (
            ExtractorKind::AfterDag,
            format!(r"(?i)\bdag[_\s]+({ID_CHARS}+)"),
        ),
        (
            ExtractorKind::AfterPreposition,
            format!(r"(?i)\b(?:for|of|on|named)\s+({ID_CHARS}+)"),
        ),
    ]
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| IntentError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

/// Compiled intent rules and entity extractors.
///
/// Build once and share; all methods take `&self` and have no side effects.
#[derive(Debug, Clone)]
pub struct QueryInterpreter {
    rules: Vec<IntentRule>,
    extractors: Vec<Extractor>,
    search_phrase: Regex,
    dag_id: Regex,
}

impl QueryInterpreter {
    /// Compile the rule set.
    pub fn new() -> Result<Self> {
        let rules = intent_rule_sources()
            .into_iter()
            .map(|(intent, src)| {
                Ok(IntentRule {
                    intent,
                    pattern: compile(&src)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let extractors = extractor_sources()
            .into_iter()
            .map(|(kind, src)| {
                Ok(Extractor {
                    kind,
                    pattern: compile(&src)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            extractors,
            search_phrase: compile(&format!(
                r#"(?i)search.*(?:for|dags?)\s+["']?({ID_CHARS}+)"#
            ))?,
            dag_id: compile(&format!("^{ID_CHARS}+$"))?,
        })
    }

    /// Run both cascades over `text`.
    pub fn interpret(&self, text: &str) -> Interpretation {
        let text = text.trim();
        let intent = self.classify_intent(text);
        let extracted = self.extract_with_kind(text);
        let search_term = (intent == Intent::Search).then(|| self.search_term(text));

        let interpretation = Interpretation {
            raw_text: text.to_string(),
            intent,
            entity: extracted.as_ref().map(|(id, _)| id.clone()),
            extractor: extracted.map(|(_, kind)| kind),
            search_term,
        };

        debug!(
            text,
            intent = %interpretation.intent,
            entity = ?interpretation.entity,
            extractor = ?interpretation.extractor,
            "query interpreted"
        );
        interpretation
    }

    /// Classify `text` by the first matching keyword rule.
    pub fn classify_intent(&self, text: &str) -> Intent {
        let lower = text.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(&lower))
            .map(|rule| rule.intent)
            .unwrap_or(Intent::Unknown)
    }

    /// Extract at most one DAG id from `text`.
    pub fn extract_entity(&self, text: &str) -> Option<String> {
        self.extract_with_kind(text).map(|(id, _)| id)
    }

    /// Like [`extract_entity`](Self::extract_entity), also reporting the
    /// strategy that produced the id.
    pub fn extract_with_kind(&self, text: &str) -> Option<(String, ExtractorKind)> {
        self.extractors.iter().find_map(|extractor| {
            let candidate = extractor.pattern.captures(text)?.get(1)?.as_str();
            if is_stopword(candidate) {
                None
            } else {
                Some((candidate.to_string(), extractor.kind))
            }
        })
    }

    /// The search term: the dedicated search phrase's capture if it matches,
    /// otherwise whatever follows the first `search` in the lower-cased text.
    pub fn search_term(&self, text: &str) -> String {
        if let Some(term) = self
            .search_phrase
            .captures(text)
            .and_then(|caps| caps.get(1))
        {
            return term.as_str().to_string();
        }
        let lower = text.to_lowercase();
        lower
            .split_once("search")
            .map(|(_, rest)| rest.trim().to_string())
            .unwrap_or_default()
    }

    /// Whether `candidate` is made only of DAG id characters.
    pub fn is_valid_dag_id(&self, candidate: &str) -> bool {
        self.dag_id.is_match(candidate)
    }
}

fn is_stopword(candidate: &str) -> bool {
    STOPWORDS
        .iter()
        .any(|stop| stop.eq_ignore_ascii_case(candidate))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
