use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::lifecycle;
use crate::state::AppState;

/// Deferred check scheduled when an assignment enters `assigned`: at
/// `expires_at`, time the assignment out unless the courier already
/// acted.
#[derive(Debug, Clone, Copy)]
pub struct SweepJob {
    pub assignment_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Background loop holding a min-heap of deadlines. Sleeps until the
/// earliest one, fires the conditional expiry, and keeps going. New jobs
/// arriving mid-sleep re-arm the timer, so an earlier deadline is never
/// missed.
pub async fn run_expiry_sweeper(state: Arc<AppState>, mut rx: mpsc::Receiver<SweepJob>) {
    info!("expiry sweeper started");

    let mut deadlines: BinaryHeap<Reverse<(DateTime<Utc>, Uuid)>> = BinaryHeap::new();

    loop {
        let now = Utc::now();
        while let Some(Reverse((at, _))) = deadlines.peek() {
            if *at > now {
                break;
            }
            let Some(Reverse((_, assignment_id))) = deadlines.pop() else {
                break;
            };
            match lifecycle::expire(&state, assignment_id, Utc::now()).await {
                Ok(true) => {}
                Ok(false) => {
                    // Courier acted before the deadline; nothing to do.
                }
                Err(err) => {
                    error!(assignment_id = %assignment_id, error = %err, "expiry sweep failed");
                }
            }
        }

        match deadlines.peek().copied() {
            Some(Reverse((next, _))) => {
                let wait = (next - Utc::now())
                    .to_std()
                    .unwrap_or(StdDuration::ZERO);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    job = rx.recv() => match job {
                        Some(job) => deadlines.push(Reverse((job.expires_at, job.assignment_id))),
                        None => break,
                    },
                }
            }
            None => match rx.recv().await {
                Some(job) => deadlines.push(Reverse((job.expires_at, job.assignment_id))),
                None => break,
            },
        }
    }

    warn!("expiry sweeper stopped: job channel closed");
}

/// Hourly sweep dropping shift trails whose last write is past the trail
/// TTL. Sample staleness is checked at read time; trails are bulk data
/// and need explicit eviction.
pub async fn run_trail_eviction(state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(StdDuration::from_secs(3_600));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        state.geo.evict_stale_trails(Utc::now());
    }
}
