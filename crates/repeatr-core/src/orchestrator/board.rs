// ── Shared unit state board ──
//
// Every unit task publishes its transitions here and waits on it for its
// dependencies. Each transition gets a global sequence number so callers
// can reason about ordering after the fact.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Lifecycle of a unit during one boot.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UnitState {
    #[default]
    Pending,
    Running,
    Ready,
    Failed,
    Degraded,
}

impl UnitState {
    /// Dependents may start once a dependency is ready or degraded.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Ready | Self::Degraded)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Degraded | Self::Failed)
    }
}

/// Current status of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub name: String,
    pub state: UnitState,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl UnitStatus {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: UnitState::Pending,
            attempts: 0,
            detail: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// One state change, in global order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub seq: u64,
    pub unit: String,
    pub state: UnitState,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct BoardState {
    pub units: BTreeMap<String, UnitStatus>,
    pub transitions: Vec<Transition>,
}

impl BoardState {
    pub fn state_of(&self, unit: &str) -> UnitState {
        self.units
            .get(unit)
            .map_or(UnitState::Pending, |status| status.state)
    }
}

pub(crate) struct Board {
    tx: watch::Sender<BoardState>,
}

impl Board {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let units = names
            .into_iter()
            .map(|name| (name.to_string(), UnitStatus::pending(name)))
            .collect();
        let (tx, _) = watch::channel(BoardState {
            units,
            transitions: Vec::new(),
        });
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<BoardState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> BoardState {
        self.tx.borrow().clone()
    }

    /// Move `unit` to `state`, recording a transition.
    pub fn transition(&self, unit: &str, state: UnitState, attempts: u32, detail: Option<String>) {
        let now = Utc::now();
        self.tx.send_modify(|board| {
            let seq = u64::try_from(board.transitions.len()).unwrap_or(u64::MAX);
            board.transitions.push(Transition {
                seq,
                unit: unit.to_string(),
                state,
                at: now,
            });
            let status = board
                .units
                .entry(unit.to_string())
                .or_insert_with(|| UnitStatus::pending(unit));
            if status.started_at.is_none() && state == UnitState::Running {
                status.started_at = Some(now);
            }
            if state.is_terminal() {
                status.finished_at = Some(now);
            }
            status.state = state;
            status.attempts = attempts;
            status.detail = detail;
        });
    }

    /// Update attempts and detail without changing state. Watchers are not
    /// woken and no transition is recorded.
    pub fn note(&self, unit: &str, attempts: u32, detail: Option<String>) {
        self.tx.send_if_modified(|board| {
            if let Some(status) = board.units.get_mut(unit) {
                status.attempts = attempts;
                status.detail = detail;
            }
            false
        });
    }
}
