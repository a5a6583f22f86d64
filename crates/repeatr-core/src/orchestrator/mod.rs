// ── Boot orchestrator ──
//
// A small DAG scheduler. Every unit runs in its own task, blocks on the
// shared board until its dependencies have settled, then runs its start
// attempts and readiness polls under the unit's retry policy. A fatal
// failure halts the whole run. A degradable unit is marked degraded on its
// first failed attempt, so its dependents start while it keeps retrying.

mod board;
mod unit;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;

use board::{Board, BoardState};

pub use board::{Transition, UnitState, UnitStatus};
pub use unit::{Criticality, Readiness, RetryPolicy, Unit, UnitSpec};

// ── Report ──────────────────────────────────────────────────────────

/// How a boot ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BootOutcome {
    /// Every unit is ready.
    Ready,
    /// Every fatal unit is ready; the listed degradable units are not.
    Degraded { units: Vec<String> },
    /// A fatal unit gave up; the run halted.
    Failed { unit: String, reason: String },
    /// The run was cancelled from outside.
    Aborted,
}

impl BootOutcome {
    /// The router is serving clients.
    pub fn is_functional(&self) -> bool {
        matches!(self, Self::Ready | Self::Degraded { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Degraded { .. } => "degraded",
            Self::Failed { .. } => "failed",
            Self::Aborted => "aborted",
        }
    }
}

/// Full record of one run, persisted as the status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootReport {
    pub outcome: BootOutcome,
    /// Units in declaration order.
    pub units: Vec<UnitStatus>,
    pub transitions: Vec<Transition>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BootReport {
    pub fn unit(&self, name: &str) -> Option<&UnitStatus> {
        self.units.iter().find(|status| status.name == name)
    }

    /// Sequence number of the first transition of `unit` into `state`.
    pub fn first_seq(&self, unit: &str, state: UnitState) -> Option<u64> {
        self.transitions
            .iter()
            .find(|t| t.unit == unit && t.state == state)
            .map(|t| t.seq)
    }
}

// ── Orchestrator ────────────────────────────────────────────────────

/// A validated unit graph, ready to run once.
pub struct Orchestrator {
    specs: Vec<UnitSpec>,
    board: Arc<Board>,
}

impl Orchestrator {
    /// Validate the graph. Rejects duplicate names, unknown dependencies
    /// and cycles.
    pub fn new(specs: Vec<UnitSpec>) -> Result<Self, CoreError> {
        validate(&specs)?;
        let board = Arc::new(Board::new(specs.iter().map(UnitSpec::name)));
        Ok(Self { specs, board })
    }

    pub fn specs(&self) -> &[UnitSpec] {
        &self.specs
    }

    /// Run every unit to a terminal state, or until `cancel` fires.
    ///
    /// Units still retrying without a limit are left running detached; use
    /// [`start`](Self::start) to wait for them.
    pub async fn run(self, cancel: CancellationToken) -> BootReport {
        self.start(cancel).await.report
    }

    /// Run until every unit has settled and report. Degradable units with
    /// unbounded retry keep retrying in the returned [`Background`] until
    /// they are ready or `cancel` fires.
    pub async fn start(self, cancel: CancellationToken) -> BootRun {
        let started_at = Utc::now();
        let halt = cancel.child_token();
        info!(units = self.specs.len(), "boot orchestration starting");

        let mut foreground = Vec::new();
        let mut unbounded = Vec::new();
        for spec in &self.specs {
            let handle = tokio::spawn(run_unit(
                spec.clone(),
                Arc::clone(&self.board),
                halt.clone(),
                cancel.clone(),
            ));
            if spec.retries_in_background() {
                unbounded.push((spec.name().to_string(), handle));
            } else {
                foreground.push(handle);
            }
        }

        for result in futures_util::future::join_all(foreground).await {
            if let Err(e) = result {
                warn!(error = %e, "unit task ended abnormally");
            }
        }

        let mut handles = Vec::new();
        for (name, mut handle) in unbounded {
            let mut rx = self.board.subscribe();
            let settled = tokio::select! {
                r = &mut handle => {
                    if let Err(e) = r {
                        warn!(unit = %name, error = %e, "unit task ended abnormally");
                    }
                    false
                }
                r = rx.wait_for(|state| state.state_of(&name).is_settled()) => r.is_ok(),
            };
            if settled && !handle.is_finished() {
                debug!(unit = %name, "unit keeps retrying in the background");
                handles.push(handle);
            }
        }

        let aborted = cancel.is_cancelled();
        let report = build_report(&self.specs, self.board.snapshot(), started_at, aborted);
        log_outcome(&report.outcome);

        BootRun {
            report,
            background: Background {
                specs: self.specs,
                board: self.board,
                handles,
                started_at,
                aborted,
            },
        }
    }
}

// ── Background retries ──────────────────────────────────────────────

/// A settled run: the report plus whatever is still retrying.
pub struct BootRun {
    pub report: BootReport,
    pub background: Background,
}

/// Degradable units still retrying after the boot report was taken.
pub struct Background {
    specs: Vec<UnitSpec>,
    board: Arc<Board>,
    handles: Vec<JoinHandle<()>>,
    started_at: DateTime<Utc>,
    aborted: bool,
}

impl Background {
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for the remaining units to become ready or stop on
    /// cancellation, then report again. Stopping leaves a degraded unit
    /// degraded.
    pub async fn finish(self) -> BootReport {
        for result in futures_util::future::join_all(self.handles).await {
            if let Err(e) = result {
                warn!(error = %e, "unit task ended abnormally");
            }
        }
        let report = build_report(
            &self.specs,
            self.board.snapshot(),
            self.started_at,
            self.aborted,
        );
        log_outcome(&report.outcome);
        report
    }
}

impl std::fmt::Debug for Background {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Background")
            .field("units", &self.handles.len())
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}

fn build_report(
    specs: &[UnitSpec],
    snapshot: BoardState,
    started_at: DateTime<Utc>,
    aborted: bool,
) -> BootReport {
    let outcome = outcome(specs, &snapshot, aborted);
    let units = specs
        .iter()
        .filter_map(|spec| snapshot.units.get(spec.name()).cloned())
        .collect();

    BootReport {
        outcome,
        units,
        transitions: snapshot.transitions,
        started_at,
        finished_at: Utc::now(),
    }
}

fn log_outcome(outcome: &BootOutcome) {
    match outcome {
        BootOutcome::Ready => info!("boot complete"),
        BootOutcome::Degraded { units } => warn!(?units, "boot complete, degraded"),
        BootOutcome::Failed { unit, reason } => warn!(unit, reason, "boot halted"),
        BootOutcome::Aborted => warn!("boot aborted"),
    }
}

fn outcome(specs: &[UnitSpec], board: &BoardState, aborted: bool) -> BootOutcome {
    if aborted {
        return BootOutcome::Aborted;
    }

    // The first unit to fail is the cause; later failures are fallout.
    let first_failure = board
        .transitions
        .iter()
        .find(|t| t.state == UnitState::Failed)
        .and_then(|t| board.units.get(&t.unit));
    if let Some(failed) = first_failure {
        return BootOutcome::Failed {
            unit: failed.name.clone(),
            reason: failed.detail.clone().unwrap_or_default(),
        };
    }

    let degraded: Vec<String> = specs
        .iter()
        .filter(|spec| board.state_of(spec.name()) == UnitState::Degraded)
        .map(|spec| spec.name().to_string())
        .collect();
    if degraded.is_empty() {
        BootOutcome::Ready
    } else {
        BootOutcome::Degraded { units: degraded }
    }
}

// ── Per-unit task ───────────────────────────────────────────────────

async fn run_unit(
    spec: UnitSpec,
    board: Arc<Board>,
    halt: CancellationToken,
    abort: CancellationToken,
) {
    let name = spec.name.clone();

    if !spec.depends_on.is_empty() {
        let mut rx = board.subscribe();
        let deps = &spec.depends_on;
        let settled = tokio::select! {
            () = halt.cancelled() => false,
            r = async {
                rx.wait_for(|state| deps.iter().all(|d| state.state_of(d).is_settled()))
                    .await
                    .map(|_| ())
            } => r.is_ok(),
        };
        if !settled {
            return;
        }
        // A dependency may have settled in the same instant the run halted.
        if halt.is_cancelled() {
            return;
        }
    }

    let mut attempt = 0u32;
    // Set once a degradable unit has settled as degraded and keeps trying.
    let mut degraded = false;
    loop {
        attempt = attempt.saturating_add(1);
        if !degraded {
            board.transition(&name, UnitState::Running, attempt, None);
        }
        debug!(unit = %name, attempt, "starting unit");

        let result = tokio::select! {
            () = halt.cancelled() => Err(CoreError::Aborted),
            r = attempt_once(&spec, &halt) => r,
        };

        let error = match result {
            Ok(()) => {
                info!(unit = %name, attempt, "unit ready");
                board.transition(&name, UnitState::Ready, attempt, None);
                return;
            }
            Err(_) if halt.is_cancelled() => {
                stop(&board, &name, attempt, degraded, &abort);
                return;
            }
            Err(e) => e.to_string(),
        };

        if !spec.retry.allows_retry_after(attempt) {
            give_up(&spec, &board, attempt, degraded, error, &halt);
            return;
        }

        warn!(unit = %name, attempt, error = %error, "unit attempt failed, retrying");
        if spec.criticality == Criticality::Degradable && !degraded {
            board.transition(&name, UnitState::Degraded, attempt, Some(error));
            degraded = true;
        } else {
            board.note(&name, attempt, Some(error));
        }

        tokio::select! {
            () = halt.cancelled() => {
                stop(&board, &name, attempt, degraded, &abort);
                return;
            }
            () = tokio::time::sleep(spec.retry.interval) => {}
        }
    }
}

/// Retries are exhausted.
fn give_up(
    spec: &UnitSpec,
    board: &Board,
    attempt: u32,
    degraded: bool,
    detail: String,
    halt: &CancellationToken,
) {
    let name = spec.name();
    match spec.criticality {
        Criticality::Fatal => {
            warn!(unit = %name, attempt, error = %detail, "fatal unit failed, halting");
            board.transition(name, UnitState::Failed, attempt, Some(detail));
            halt.cancel();
        }
        Criticality::Degradable => {
            warn!(unit = %name, attempt, error = %detail, "unit degraded");
            if degraded {
                board.note(name, attempt, Some(detail));
            } else {
                board.transition(name, UnitState::Degraded, attempt, Some(detail));
            }
        }
    }
}

/// The run halted or was aborted while `name` was still working.
fn stop(board: &Board, name: &str, attempt: u32, degraded: bool, abort: &CancellationToken) {
    let reason = stop_reason(abort);
    if degraded {
        board.note(name, attempt, Some(format!("retries stopped: {reason}")));
    } else {
        board.transition(name, UnitState::Failed, attempt, Some(reason));
    }
}

fn stop_reason(abort: &CancellationToken) -> String {
    if abort.is_cancelled() {
        "aborted".into()
    } else {
        "halted after another unit failed".into()
    }
}

/// One start attempt followed by the bounded readiness gate.
async fn attempt_once(spec: &UnitSpec, cancel: &CancellationToken) -> Result<(), CoreError> {
    spec.unit.start(cancel).await?;

    let polls = spec.readiness.polls.max(1);
    for poll in 1..=polls {
        if spec.unit.is_ready().await {
            return Ok(());
        }
        if poll < polls {
            tokio::time::sleep(spec.readiness.interval).await;
        }
    }
    Err(CoreError::UnitFailed {
        unit: spec.name.clone(),
        reason: format!("not ready after {polls} readiness poll(s)"),
    })
}

// ── Graph validation ────────────────────────────────────────────────

fn validate(specs: &[UnitSpec]) -> Result<(), CoreError> {
    let mut names = BTreeSet::new();
    for spec in specs {
        if !names.insert(spec.name()) {
            return Err(CoreError::InvalidUnitGraph {
                reason: format!("duplicate unit '{}'", spec.name()),
            });
        }
    }

    for spec in specs {
        if let Some(missing) = spec.depends_on.iter().find(|d| !names.contains(d.as_str())) {
            return Err(CoreError::InvalidUnitGraph {
                reason: format!("unit '{}' depends on unknown unit '{missing}'", spec.name()),
            });
        }
    }

    // Kahn's algorithm: anything left unvisited sits on a cycle.
    let mut indegree: BTreeMap<&str, usize> = specs
        .iter()
        .map(|spec| (spec.name(), spec.depends_on.len()))
        .collect();
    let mut queue: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut visited = 0usize;

    while let Some(done) = queue.pop_front() {
        visited += 1;
        for spec in specs {
            if spec.depends_on.iter().any(|d| d == done) {
                if let Some(degree) = indegree.get_mut(spec.name()) {
                    *degree -= spec.depends_on.iter().filter(|d| *d == done).count();
                    if *degree == 0 {
                        queue.push_back(spec.name());
                    }
                }
            }
        }
    }

    if visited < specs.len() {
        let cyclic: Vec<&str> = indegree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(name, _)| name)
            .collect();
        return Err(CoreError::InvalidUnitGraph {
            reason: format!("dependency cycle among {}", cyclic.join(", ")),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use rand::Rng;

    use super::*;

    /// Unit with a scripted number of failures and an optional random delay.
    #[derive(Default)]
    struct ScriptedUnit {
        failures_left: AtomicU32,
        max_delay_ms: u64,
        never_ready: bool,
        /// `start` reports `Aborted` on its own, without any cancellation.
        self_abort: bool,
    }

    impl ScriptedUnit {
        fn ok() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn failing(times: u32) -> Arc<Self> {
            Arc::new(Self {
                failures_left: AtomicU32::new(times),
                ..Self::default()
            })
        }

        fn jittery(max_delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                max_delay_ms,
                ..Self::default()
            })
        }
    }

    #[async_trait]
    impl Unit for ScriptedUnit {
        async fn start(&self, _cancel: &CancellationToken) -> Result<(), CoreError> {
            if self.max_delay_ms > 0 {
                let pause = rand::thread_rng().gen_range(0..=self.max_delay_ms);
                tokio::time::sleep(Duration::from_millis(pause)).await;
            }
            if self.self_abort {
                return Err(CoreError::Aborted);
            }
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(CoreError::Internal("scripted failure".into()));
            }
            Ok(())
        }

        async fn is_ready(&self) -> bool {
            !self.never_ready
        }
    }

    fn quick() -> Readiness {
        Readiness {
            polls: 3,
            interval: Duration::from_millis(10),
        }
    }

    fn standard_shape(units: [Arc<dyn Unit>; 6], uplink_retry: RetryPolicy) -> Vec<UnitSpec> {
        let [reg, prep, ip, uplink, beacon, dhcp] = units;
        vec![
            UnitSpec::new("regulatory-domain", reg).readiness(quick()),
            UnitSpec::new("ap-interface-prep", prep)
                .after(["regulatory-domain"])
                .readiness(quick()),
            UnitSpec::new("static-ip-assignment", ip)
                .after(["ap-interface-prep"])
                .readiness(quick()),
            UnitSpec::new("uplink-association", uplink)
                .after(["regulatory-domain"])
                .retry(uplink_retry)
                .readiness(quick())
                .degradable(),
            UnitSpec::new("beaconing", beacon)
                .after(["static-ip-assignment", "uplink-association"])
                .readiness(quick()),
            UnitSpec::new("dhcp-dns", dhcp)
                .after(["static-ip-assignment", "uplink-association"])
                .readiness(quick()),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn dependents_never_start_before_dependencies_are_ready() {
        for _ in 0..50 {
            let units: [Arc<dyn Unit>; 6] = [
                ScriptedUnit::jittery(40),
                ScriptedUnit::jittery(40),
                ScriptedUnit::jittery(40),
                ScriptedUnit::jittery(40),
                ScriptedUnit::jittery(40),
                ScriptedUnit::jittery(40),
            ];
            let orchestrator =
                Orchestrator::new(standard_shape(units, RetryPolicy::once())).unwrap();
            let report = orchestrator.run(CancellationToken::new()).await;

            assert_eq!(report.outcome, BootOutcome::Ready);
            let ip_ready = report.first_seq("static-ip-assignment", UnitState::Ready).unwrap();
            for dependent in ["beaconing", "dhcp-dns"] {
                let started = report.first_seq(dependent, UnitState::Running).unwrap();
                let ready = report.first_seq(dependent, UnitState::Ready).unwrap();
                assert!(started > ip_ready, "{dependent} started before addressing");
                assert!(ready > ip_ready);
            }
            let prep_ready = report.first_seq("ap-interface-prep", UnitState::Ready).unwrap();
            let ip_started = report.first_seq("static-ip-assignment", UnitState::Running).unwrap();
            assert!(ip_started > prep_ready);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn degradable_failure_does_not_block_the_access_point() {
        let units: [Arc<dyn Unit>; 6] = [
            ScriptedUnit::ok(),
            ScriptedUnit::ok(),
            ScriptedUnit::ok(),
            ScriptedUnit::failing(u32::MAX),
            ScriptedUnit::ok(),
            ScriptedUnit::ok(),
        ];
        let retry = RetryPolicy::bounded(3, Duration::from_secs(5));
        let report = Orchestrator::new(standard_shape(units, retry))
            .unwrap()
            .run(CancellationToken::new())
            .await;

        assert_eq!(
            report.outcome,
            BootOutcome::Degraded {
                units: vec!["uplink-association".into()]
            }
        );
        let uplink = report.unit("uplink-association").unwrap();
        assert_eq!(uplink.state, UnitState::Degraded);
        assert_eq!(uplink.attempts, 3);
        assert_eq!(report.unit("beaconing").unwrap().state, UnitState::Ready);
        assert_eq!(report.unit("dhcp-dns").unwrap().state, UnitState::Ready);
        assert!(report.outcome.is_functional());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_recovers_within_retry_budget() {
        let units: [Arc<dyn Unit>; 6] = [
            ScriptedUnit::ok(),
            ScriptedUnit::ok(),
            ScriptedUnit::ok(),
            ScriptedUnit::failing(2),
            ScriptedUnit::ok(),
            ScriptedUnit::ok(),
        ];
        let retry = RetryPolicy::bounded(3, Duration::from_secs(5));
        let report = Orchestrator::new(standard_shape(units, retry))
            .unwrap()
            .run(CancellationToken::new())
            .await;

        assert_eq!(report.outcome, BootOutcome::Ready);
        assert_eq!(report.unit("uplink-association").unwrap().attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_halts_and_leaves_dependents_pending() {
        let units: [Arc<dyn Unit>; 6] = [
            ScriptedUnit::ok(),
            ScriptedUnit::ok(),
            ScriptedUnit::failing(u32::MAX),
            ScriptedUnit::ok(),
            ScriptedUnit::ok(),
            ScriptedUnit::ok(),
        ];
        let report = Orchestrator::new(standard_shape(units, RetryPolicy::once()))
            .unwrap()
            .run(CancellationToken::new())
            .await;

        assert!(matches!(
            report.outcome,
            BootOutcome::Failed { ref unit, .. } if unit == "static-ip-assignment"
        ));
        assert_eq!(report.unit("beaconing").unwrap().state, UnitState::Pending);
        assert_eq!(report.unit("dhcp-dns").unwrap().state, UnitState::Pending);
        assert!(!report.outcome.is_functional());
    }

    #[tokio::test(start_paused = true)]
    async fn unready_unit_fails_after_bounded_polls() {
        let never_ready = Arc::new(ScriptedUnit {
            never_ready: true,
            ..ScriptedUnit::default()
        });
        let specs = vec![UnitSpec::new("stuck", never_ready).readiness(quick())];
        let report = Orchestrator::new(specs)
            .unwrap()
            .run(CancellationToken::new())
            .await;
        let stuck = report.unit("stuck").unwrap();
        assert_eq!(stuck.state, UnitState::Failed);
        assert!(stuck.detail.as_deref().unwrap().contains("3 readiness poll"));
    }

    fn standard_units_with_uplink(uplink: Arc<dyn Unit>) -> [Arc<dyn Unit>; 6] {
        [
            ScriptedUnit::ok(),
            ScriptedUnit::ok(),
            ScriptedUnit::ok(),
            uplink,
            ScriptedUnit::ok(),
            ScriptedUnit::ok(),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_uplink_retry_still_serves_the_access_point() {
        let units = standard_units_with_uplink(ScriptedUnit::failing(u32::MAX));
        let retry = RetryPolicy::unbounded(Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let orchestrator = Orchestrator::new(standard_shape(units, retry)).unwrap();

        let run = tokio::time::timeout(
            Duration::from_secs(3600),
            orchestrator.start(cancel.clone()),
        )
        .await
        .expect("boot never settled");

        assert_eq!(
            run.report.outcome,
            BootOutcome::Degraded {
                units: vec!["uplink-association".into()]
            }
        );
        assert_eq!(run.report.unit("beaconing").unwrap().state, UnitState::Ready);
        assert_eq!(run.report.unit("dhcp-dns").unwrap().state, UnitState::Ready);
        assert!(!run.background.is_empty());

        // Stopping the retries keeps the boot degraded, not aborted.
        tokio::time::sleep(Duration::from_secs(35)).await;
        cancel.cancel();
        let last = run.background.finish().await;
        assert!(matches!(last.outcome, BootOutcome::Degraded { .. }));
        let uplink = last.unit("uplink-association").unwrap();
        assert_eq!(uplink.state, UnitState::Degraded);
        assert!(uplink.attempts > 1);
        assert_eq!(uplink.detail.as_deref(), Some("retries stopped: aborted"));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_uplink_retry_recovers_in_the_background() {
        let units = standard_units_with_uplink(ScriptedUnit::failing(4));
        let retry = RetryPolicy::unbounded(Duration::from_secs(1));
        let run = Orchestrator::new(standard_shape(units, retry))
            .unwrap()
            .start(CancellationToken::new())
            .await;
        assert!(matches!(run.report.outcome, BootOutcome::Degraded { .. }));

        let last = run.background.finish().await;
        assert_eq!(last.outcome, BootOutcome::Ready);
        assert_eq!(last.unit("uplink-association").unwrap().attempts, 5);
        let degraded = last.first_seq("uplink-association", UnitState::Degraded).unwrap();
        let beacon_started = last.first_seq("beaconing", UnitState::Running).unwrap();
        assert!(beacon_started > degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_run_has_nothing_in_the_background() {
        let units = standard_units_with_uplink(ScriptedUnit::failing(u32::MAX));
        let retry = RetryPolicy::bounded(2, Duration::from_secs(1));
        let run = Orchestrator::new(standard_shape(units, retry))
            .unwrap()
            .start(CancellationToken::new())
            .await;
        assert!(run.background.is_empty());
        assert_eq!(run.report.unit("uplink-association").unwrap().attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unit_reporting_aborted_is_an_ordinary_failure() {
        let self_abort = || {
            Arc::new(ScriptedUnit {
                self_abort: true,
                ..ScriptedUnit::default()
            })
        };

        let units: [Arc<dyn Unit>; 6] = [
            ScriptedUnit::ok(),
            ScriptedUnit::ok(),
            self_abort(),
            ScriptedUnit::ok(),
            ScriptedUnit::ok(),
            ScriptedUnit::ok(),
        ];
        let report = tokio::time::timeout(
            Duration::from_secs(60),
            Orchestrator::new(standard_shape(units, RetryPolicy::once()))
                .unwrap()
                .run(CancellationToken::new()),
        )
        .await
        .expect("run did not halt");
        assert!(matches!(
            report.outcome,
            BootOutcome::Failed { ref unit, .. } if unit == "static-ip-assignment"
        ));
        assert_eq!(report.unit("beaconing").unwrap().state, UnitState::Pending);

        let report = Orchestrator::new(standard_shape(
            standard_units_with_uplink(self_abort()),
            RetryPolicy::once(),
        ))
        .unwrap()
        .run(CancellationToken::new())
        .await;
        assert!(matches!(report.outcome, BootOutcome::Degraded { .. }));
        assert_eq!(report.unit("beaconing").unwrap().state, UnitState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_stops_unbounded_retry() {
        let specs = vec![
            UnitSpec::new("uplink", ScriptedUnit::failing(u32::MAX))
                .retry(RetryPolicy::unbounded(Duration::from_secs(1))),
            UnitSpec::new("after", ScriptedUnit::ok()).after(["uplink"]),
        ];
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            trigger.cancel();
        });

        let report = Orchestrator::new(specs).unwrap().run(cancel).await;
        assert_eq!(report.outcome, BootOutcome::Aborted);
        let uplink = report.unit("uplink").unwrap();
        assert_eq!(uplink.state, UnitState::Failed);
        assert_eq!(uplink.detail.as_deref(), Some("aborted"));
        assert_eq!(report.unit("after").unwrap().state, UnitState::Pending);
    }

    #[test]
    fn rejects_cycles() {
        let specs = vec![
            UnitSpec::new("a", ScriptedUnit::ok()).after(["c"]),
            UnitSpec::new("b", ScriptedUnit::ok()).after(["a"]),
            UnitSpec::new("c", ScriptedUnit::ok()).after(["b"]),
            UnitSpec::new("root", ScriptedUnit::ok()),
        ];
        let Err(CoreError::InvalidUnitGraph { reason }) = Orchestrator::new(specs) else {
            panic!("cycle accepted");
        };
        assert!(reason.contains("cycle"));
        assert!(!reason.contains("root"));
    }

    #[test]
    fn rejects_unknown_and_duplicate_units() {
        let unknown = vec![UnitSpec::new("a", ScriptedUnit::ok()).after(["ghost"])];
        assert!(matches!(
            Orchestrator::new(unknown),
            Err(CoreError::InvalidUnitGraph { .. })
        ));

        let duplicate = vec![
            UnitSpec::new("a", ScriptedUnit::ok()),
            UnitSpec::new("a", ScriptedUnit::ok()),
        ];
        assert!(matches!(
            Orchestrator::new(duplicate),
            Err(CoreError::InvalidUnitGraph { .. })
        ));
    }

    #[test]
    fn report_serializes_outcome_kind() {
        let report = BootReport {
            outcome: BootOutcome::Degraded {
                units: vec!["uplink-association".into()],
            },
            units: Vec::new(),
            transitions: Vec::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"]["kind"], "degraded");
        let back: BootReport = serde_json::from_value(json).unwrap();
        assert_eq!(back.outcome, report.outcome);
    }
}
