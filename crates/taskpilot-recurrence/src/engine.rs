use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use taskpilot_core::Clock;
use taskpilot_store::{StoreError, TaskStore};

/// Counters from one materialisation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Occurrences created this sweep.
    pub materialised: u32,
    /// Templates that turned out to be already handled (racing tick).
    pub skipped: u32,
    /// Templates whose transaction failed; retried next sweep.
    pub failed: u32,
}

/// Drives recurring-task materialisation at a fixed cadence.
///
/// The engine holds no scheduling state of its own: each sweep re-reads
/// due templates from the store, so restarts and concurrent instances are
/// safe. Time comes from the injected clock; tests call [`tick`] directly
/// and step a manual clock instead of sleeping.
///
/// [`tick`]: MaterialiserEngine::tick
pub struct MaterialiserEngine {
    store: Arc<TaskStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl MaterialiserEngine {
    pub fn new(store: Arc<TaskStore>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            store,
            clock,
            interval,
        }
    }

    /// One sweep: materialise at most one missed occurrence per due
    /// template. Each template runs in its own transaction; a failure is
    /// counted and logged, never propagated to its siblings.
    pub fn tick(&self) -> Result<TickReport, StoreError> {
        let now = self.clock.now();
        let due = self.store.due_templates(now)?;
        let mut report = TickReport::default();

        for template in due {
            match self.store.materialise_occurrence(template.id, now) {
                Ok(Some(task)) => {
                    info!(
                        template_id = template.id,
                        task_id = task.id,
                        user_id = %task.user_id,
                        "materialised recurring task"
                    );
                    report.materialised += 1;
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    warn!(template_id = template.id, error = %e, "materialisation failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Main loop. Sweeps on every interval tick until `shutdown`
    /// broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "materialiser started");

        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick() {
                        Ok(report) if report.materialised > 0 || report.failed > 0 => {
                            info!(
                                materialised = report.materialised,
                                skipped = report.skipped,
                                failed = report.failed,
                                "materialiser sweep done"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!("materialiser sweep error: {e}"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("materialiser shutting down");
                        break;
                    }
                }
            }
        }
    }
}
