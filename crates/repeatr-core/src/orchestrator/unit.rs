use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;

/// A step of the boot sequence.
///
/// `start` performs one attempt; `is_ready` is the readiness gate polled
/// after every successful start. Both should return promptly once
/// `cancel` fires.
#[async_trait]
pub trait Unit: Send + Sync {
    async fn start(&self, cancel: &CancellationToken) -> Result<(), CoreError>;

    async fn is_ready(&self) -> bool;
}

// ── RetryPolicy ─────────────────────────────────────────────────────

/// How often a unit is started before it is given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// `None` retries until cancelled.
    pub max_attempts: Option<u32>,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn once() -> Self {
        Self::bounded(1, Duration::ZERO)
    }

    pub fn bounded(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            interval,
        }
    }

    pub fn unbounded(interval: Duration) -> Self {
        Self {
            max_attempts: None,
            interval,
        }
    }

    /// Whether another attempt may follow attempt number `attempt`.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

// ── Readiness ───────────────────────────────────────────────────────

/// Bounded polling of a unit's readiness predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub polls: u32,
    pub interval: Duration,
}

impl Default for Readiness {
    fn default() -> Self {
        Self {
            polls: 10,
            interval: Duration::from_millis(500),
        }
    }
}

/// What a unit's final failure does to the boot.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Criticality {
    /// Halts the orchestrator.
    #[default]
    Fatal,
    /// Recorded as degraded; dependents still start.
    Degradable,
}

// ── UnitSpec ────────────────────────────────────────────────────────

/// A unit plus its place in the graph.
#[derive(Clone)]
pub struct UnitSpec {
    pub(crate) name: String,
    pub(crate) depends_on: Vec<String>,
    pub(crate) retry: RetryPolicy,
    pub(crate) readiness: Readiness,
    pub(crate) criticality: Criticality,
    pub(crate) unit: Arc<dyn Unit>,
}

impl UnitSpec {
    pub fn new(name: impl Into<String>, unit: Arc<dyn Unit>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            retry: RetryPolicy::default(),
            readiness: Readiness::default(),
            criticality: Criticality::default(),
            unit,
        }
    }

    pub fn after<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn degradable(mut self) -> Self {
        self.criticality = Criticality::Degradable;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn criticality(&self) -> Criticality {
        self.criticality
    }

    /// Degradable with no attempt limit: may outlive the boot report.
    pub(crate) fn retries_in_background(&self) -> bool {
        self.criticality == Criticality::Degradable && self.retry.max_attempts.is_none()
    }
}

impl std::fmt::Debug for UnitSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitSpec")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("retry", &self.retry)
            .field("readiness", &self.readiness)
            .field("criticality", &self.criticality)
            .finish_non_exhaustive()
    }
}
