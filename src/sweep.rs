use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::probe::Prober;
use crate::report::{Console, Tag};
use crate::types::{AggregateResult, ScanStats, SweepResults};

/// Number of workers for a sweep: explicit override, else available hardware
/// parallelism, never less than 1.
pub fn worker_count(requested: Option<usize>) -> usize {
    match requested {
        Some(n) => n.max(1),
        None => std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1),
    }
}

/// Floor-division index-range partition: shard `i` covers
/// `[i*len/w, (i+1)*len/w)`. Contiguous, disjoint, covers the whole input;
/// shards may be empty when `len < w`.
pub fn shard_bounds(len: usize, workers: usize) -> Vec<(usize, usize)> {
    let w = workers.max(1);
    (0..w).map(|i| (i * len / w, (i + 1) * len / w)).collect()
}

/// What one worker hands back: its local authorized map and how many of its
/// targets it actually attempted (everything before a cancellation point).
struct ShardReport {
    authorized: BTreeMap<String, String>,
    attempted: usize,
}

/// Probe one shard's targets strictly sequentially, emitting one progress
/// line per result. Never touches the shared aggregate.
async fn run_shard<P: Prober + ?Sized>(
    shard_index: usize,
    targets: Vec<String>,
    prober: Arc<P>,
    console: Arc<Console>,
    cancel: CancellationToken,
) -> ShardReport {
    let mut authorized = BTreeMap::new();
    let mut attempted = 0;
    for target in &targets {
        if cancel.is_cancelled() {
            break;
        }
        let outcome = prober.probe(target).await;
        console.progress(shard_index, target, &outcome).await;
        if let crate::types::ProbeOutcome::Authorized { metadata, .. } = outcome {
            // Last write wins for duplicated input targets.
            authorized.insert(target.clone(), metadata);
        }
        attempted += 1;
    }
    ShardReport {
        authorized,
        attempted,
    }
}

/// Partition `targets` across workers, probe every target exactly once, and
/// merge the per-shard results after all workers have joined.
///
/// A worker that panics loses only its own shard: its targets are reported in
/// `unattempted` and every other shard's results are kept. Ctrl-C cancels
/// between targets; skipped targets are likewise accounted as unattempted.
pub async fn run_sweep<P>(
    prober: Arc<P>,
    targets: &[String],
    workers: Option<usize>,
    console: Arc<Console>,
    cancel: CancellationToken,
) -> Result<SweepResults>
where
    P: Prober + ?Sized + 'static,
{
    let start = Instant::now();
    let w = worker_count(workers);
    console.line(Tag::Plus, &format!("starting {w} workers")).await;

    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_ctrlc.cancel();
    });

    let mut handles = Vec::with_capacity(w);
    for (index, (lo, hi)) in shard_bounds(targets.len(), w).into_iter().enumerate() {
        let shard = targets[lo..hi].to_vec();
        let handle = tokio::spawn(run_shard(
            index,
            shard,
            prober.clone(),
            console.clone(),
            cancel.clone(),
        ));
        handles.push((index, lo, hi, handle));
    }

    let mut authorized = AggregateResult::new();
    let mut unattempted = Vec::new();
    let mut aborted = Vec::new();
    for (index, lo, hi, handle) in handles {
        match handle.await {
            Ok(report) => {
                authorized.extend(report.authorized);
                // Anything past the attempted prefix was skipped by a
                // cancellation and its outcome is unknown.
                unattempted.extend(targets[lo + report.attempted..hi].iter().cloned());
            }
            Err(e) => {
                warn!(worker = index + 1, error = %e, "worker aborted");
                console
                    .line(
                        Tag::Minus,
                        &format!(
                            "worker {} aborted; outcomes for its shard are lost: {e}",
                            index + 1
                        ),
                    )
                    .await;
                aborted.extend(targets[lo..hi].iter().cloned());
            }
        }
    }

    console.line(Tag::Plus, "workers finished").await;
    Ok(SweepResults {
        authorized,
        stats: ScanStats {
            total_targets: targets.len(),
            elapsed: start.elapsed(),
        },
        unattempted,
        aborted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_uses_floor_division() {
        // 5 targets across 2 workers: [0,2) and [2,5), never [0,3),[3,5).
        assert_eq!(shard_bounds(5, 2), vec![(0, 2), (2, 5)]);
    }

    #[test]
    fn partition_covers_input_exactly_once() {
        for len in 0..40 {
            for w in 1..10 {
                let bounds = shard_bounds(len, w);
                assert_eq!(bounds.len(), w);
                assert_eq!(bounds[0].0, 0);
                assert_eq!(bounds[w - 1].1, len);
                for pair in bounds.windows(2) {
                    assert_eq!(pair[0].1, pair[1].0);
                }
            }
        }
    }

    #[test]
    fn more_workers_than_targets_leaves_empty_shards() {
        let bounds = shard_bounds(2, 4);
        let covered: usize = bounds.iter().map(|(lo, hi)| hi - lo).sum();
        assert_eq!(covered, 2);
        assert!(bounds.iter().any(|(lo, hi)| lo == hi));
    }

    #[test]
    fn worker_count_is_at_least_one() {
        assert_eq!(worker_count(Some(0)), 1);
        assert_eq!(worker_count(Some(7)), 7);
        assert!(worker_count(None) >= 1);
    }
}
