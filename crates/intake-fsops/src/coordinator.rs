//! Single-flight dispatch of discovered files.
//!
//! # Design
//! - One task per manager owns the seen-set; no lock guards it because no
//!   other task can reach it.
//! - Checking and marking a path happen inside one `select!` arm, so two
//!   events for the same path can never both dispatch.
//! - Teardown closes the inbound channel, then waits for every move.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use intake_config::SeenPolicy;
use intake_events::Event;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, enabled, error, trace};
use uuid::Uuid;

use crate::model::{FileEvent, MoveOutcome};
use crate::mover::FileMover;
use crate::reporter::Reporter;

pub(crate) struct IngestCoordinator {
    manager_id: Uuid,
    receiver: mpsc::Receiver<FileEvent>,
    cancel: CancellationToken,
    mover: FileMover,
    reporter: Reporter,
    policy: SeenPolicy,
    report_interval: Duration,
    seen: HashSet<PathBuf>,
    moves: JoinSet<MoveOutcome>,
}

impl IngestCoordinator {
    pub(crate) fn new(
        manager_id: Uuid,
        receiver: mpsc::Receiver<FileEvent>,
        cancel: CancellationToken,
        mover: FileMover,
        reporter: Reporter,
        policy: SeenPolicy,
        report_interval: Duration,
    ) -> Self {
        Self {
            manager_id,
            receiver,
            cancel,
            mover,
            reporter,
            policy,
            report_interval,
            seen: HashSet::new(),
            moves: JoinSet::new(),
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut report = tokio::time::interval_at(
            Instant::now() + self.report_interval,
            self.report_interval,
        );
        report.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                Some(joined) = self.moves.join_next(), if !self.moves.is_empty() => {
                    self.reap(joined);
                }
                received = self.receiver.recv() => match received {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
                _ = report.tick() => self.report_state(),
            }
        }

        self.receiver.close();
        let pending = self.moves.len();
        if pending > 0 {
            debug!(manager_id = %self.manager_id, pending, "waiting for in-flight moves");
        }
        while let Some(joined) = self.moves.join_next().await {
            self.reap(joined);
        }
        debug!(
            manager_id = %self.manager_id,
            seen = self.seen.len(),
            "coordinator stopped"
        );
    }

    fn dispatch(&mut self, event: FileEvent) {
        if self.seen.contains(&event.path) {
            self.reporter.metrics().inc_duplicate();
            trace!(path = %event.path.display(), "duplicate discovery dropped");
            return;
        }
        // A forgotten path can be rediscovered by a scan that raced the move.
        if self.policy == SeenPolicy::ForgetAfterMove
            && matches!(event.path.try_exists(), Ok(false))
        {
            self.reporter.metrics().inc_duplicate();
            trace!(path = %event.path.display(), "stale discovery dropped");
            return;
        }
        self.seen.insert(event.path.clone());
        let path = event.path.display().to_string();
        let metrics = self.reporter.metrics();
        metrics.inc_discovered();
        metrics.inc_inflight_moves();
        debug!(manager_id = %self.manager_id, path = %path, "file queued");
        self.reporter.publish(Event::FileQueued {
            manager_id: self.manager_id,
            path,
        });
        let mover = self.mover.clone();
        self.moves.spawn(async move { mover.relocate(event).await });
    }

    fn reap(&mut self, joined: Result<MoveOutcome, JoinError>) {
        self.reporter.metrics().dec_inflight_moves();
        match joined {
            Ok(outcome) => {
                if forgets(self.policy, &outcome) {
                    self.seen.remove(outcome.source());
                }
            }
            Err(err) => {
                error!(
                    manager_id = %self.manager_id,
                    error = %err,
                    "move task terminated abnormally"
                );
            }
        }
    }

    fn report_state(&self) {
        debug!(
            manager_id = %self.manager_id,
            seen = self.seen.len(),
            in_flight = self.moves.len(),
            "coordinator state"
        );
        if enabled!(Level::TRACE) {
            for path in &self.seen {
                trace!(manager_id = %self.manager_id, path = %path.display(), "seen path");
            }
        }
    }
}

/// Whether a finished move releases its source path for rediscovery.
///
/// Under [`SeenPolicy::ForgetAfterMove`] a path is released once nothing is
/// left at it: after a successful move, or after a failure caused by the
/// source having vanished.
fn forgets(policy: SeenPolicy, outcome: &MoveOutcome) -> bool {
    policy == SeenPolicy::ForgetAfterMove
        && matches!(
            outcome,
            MoveOutcome::Moved { .. }
                | MoveOutcome::Failed {
                    source_missing: true,
                    ..
                }
        )
}
