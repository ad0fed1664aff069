use std::sync::Mutex;

use log::{debug, info};

use manet_core::bucket::Bucket;
use manet_core::error::ExperimentError;
use manet_core::scheduler::Scheduler;

/// Only one engine may run per process. A second experiment waits for the first.
static ENGINE_LOCK: Mutex<()> = Mutex::new(());

/// Number of progress messages logged over a run.
const PROGRESS_REPORTS: u64 = 10;

/// Runs the scheduler from time zero until its duration and stops it.
///
/// The scheduler is initialised once and terminated once, then destroyed; the bucket is handed
/// back so that the caller can collect whatever the run produced. A poisoned lock only means
/// that an earlier run panicked, so the guard is recovered.
pub fn run_simulation<B, S>(mut scheduler: S) -> Result<B, ExperimentError>
where
    S: Scheduler<B>,
    B: Bucket,
{
    let _guard = match ENGINE_LOCK.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    let end_time = scheduler.duration().as_u64();
    let report_every = (end_time / PROGRESS_REPORTS).max(1);
    let mut next_report = report_every;
    info!("Starting the engine for {} ms", end_time);

    let mut now = scheduler.now().as_u64();
    scheduler.initialize();
    while now < end_time {
        scheduler.activate();
        now = scheduler.trigger().as_u64();
        if now >= next_report {
            info!(
                "Simulated {} of {} ms with {} active applications",
                now,
                end_time,
                scheduler.active_apps()
            );
            while next_report <= now {
                next_report += report_every;
            }
        }
    }

    debug!("Stopping the engine at {} ms", now);
    let bucket = scheduler.terminate()?;
    info!("Engine stopped");
    Ok(bucket)
}
