//! Background preload of every page of the current document

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::cache::PageImageCache;
use super::epoch::EpochClock;
use super::error::{RenderError, ResolveError};
use super::types::{Epoch, PageNumber};

/// Default number of pages rendered concurrently per batch
pub const DEFAULT_BATCH_SIZE: usize = 2;

/// Default pause between batches
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(18);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreloadConfig {
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }
}

/// Summary of one preload sweep
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreloadReport {
    /// Batches that were started
    pub batches: usize,
    /// Pages rendered successfully (cache hits included)
    pub rendered: usize,
    /// Pages the renderer failed on
    pub failed: usize,
    /// The document changed before the sweep finished
    pub cancelled: bool,
}

/// Walks all pages in small concurrent batches, filling the cache.
///
/// The sweep is tagged with the epoch it was started for and stops before
/// the next batch as soon as the [`EpochClock`] moves on. Render failures
/// are logged and skipped.
#[derive(Clone)]
pub struct PreloadScheduler {
    cache: Arc<PageImageCache>,
    clock: EpochClock,
    config: PreloadConfig,
}

impl PreloadScheduler {
    #[must_use]
    pub fn new(cache: Arc<PageImageCache>, clock: EpochClock, config: PreloadConfig) -> Self {
        Self {
            cache,
            clock,
            config,
        }
    }

    /// Run the sweep on the calling thread
    pub fn run(&self, run_id: Epoch, total_pages: u32) -> PreloadReport {
        let started = Instant::now();
        let pages: Vec<PageNumber> = (1..=total_pages).collect();
        let batch_size = self.config.batch_size.max(1);
        let batch_total = pages.len().div_ceil(batch_size);
        let mut report = PreloadReport::default();

        for (n, batch) in pages.chunks(batch_size).enumerate() {
            if !self.clock.is_current(run_id) {
                debug!("Preload run {run_id} superseded after {} batches", report.batches);
                report.cancelled = true;
                break;
            }
            report.batches += 1;

            for (page, outcome) in batch.iter().zip(self.render_batch(run_id, batch)) {
                match outcome {
                    Ok(()) => report.rendered += 1,
                    Err(e) if e.is_stale() => debug!("Preload of page {page} went stale"),
                    Err(e) => {
                        warn!("Preload skipped page {page}: {e}");
                        report.failed += 1;
                    }
                }
            }

            if n + 1 < batch_total && !self.config.batch_delay.is_zero() {
                thread::sleep(self.config.batch_delay);
            }
        }

        info!(
            "Preload run {run_id}: {}/{} pages in {} batches ({} failed{}) in {}ms",
            report.rendered,
            total_pages,
            report.batches,
            report.failed,
            if report.cancelled { ", cancelled" } else { "" },
            started.elapsed().as_millis()
        );
        report
    }

    /// Run the sweep on a background thread
    pub fn spawn(self, run_id: Epoch, total_pages: u32) -> PreloadHandle {
        let handle = thread::Builder::new()
            .name(format!("flipbook-preload-{run_id}"))
            .spawn(move || self.run(run_id, total_pages));

        match handle {
            Ok(handle) => PreloadHandle {
                run_id,
                handle: Some(handle),
            },
            Err(e) => {
                warn!("Could not start preload thread: {e}");
                PreloadHandle {
                    run_id,
                    handle: None,
                }
            }
        }
    }

    fn render_batch(&self, run_id: Epoch, batch: &[PageNumber]) -> Vec<Result<(), ResolveError>> {
        thread::scope(|s| {
            let renders: Vec<_> = batch
                .iter()
                .map(|&page| s.spawn(move || self.cache.render(run_id, page).map(|_| ())))
                .collect();

            renders
                .into_iter()
                .map(|render| {
                    render.join().unwrap_or_else(|_| {
                        Err(ResolveError::Render(RenderError::engine("renderer panicked")))
                    })
                })
                .collect()
        })
    }
}

/// A running (or finished) preload sweep
#[derive(Debug)]
pub struct PreloadHandle {
    run_id: Epoch,
    handle: Option<JoinHandle<PreloadReport>>,
}

impl PreloadHandle {
    #[must_use]
    pub fn run_id(&self) -> Epoch {
        self.run_id
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the sweep to end. `None` if it never started or panicked.
    pub fn join(mut self) -> Option<PreloadReport> {
        self.handle.take()?.join().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::ScriptedRenderer;

    fn setup(renderer: &Arc<ScriptedRenderer>, pages: u32) -> (Arc<PageImageCache>, EpochClock) {
        let clock = EpochClock::new();
        let epoch = clock.advance();
        let cache = Arc::new(PageImageCache::new(64));
        cache.begin_epoch(epoch, renderer.clone(), pages, 1.0);
        (cache, clock)
    }

    fn quick(batch_size: usize) -> PreloadConfig {
        PreloadConfig {
            batch_size,
            batch_delay: Duration::ZERO,
        }
    }

    #[test]
    fn seven_pages_take_four_batches() {
        let renderer = Arc::new(ScriptedRenderer::new(7));
        let (cache, clock) = setup(&renderer, 7);
        let scheduler = PreloadScheduler::new(cache.clone(), clock.clone(), quick(2));

        let report = scheduler.run(clock.current(), 7);

        assert_eq!(
            report,
            PreloadReport {
                batches: 4,
                rendered: 7,
                failed: 0,
                cancelled: false,
            }
        );
        assert_eq!(cache.len(), 7);
        assert_eq!(renderer.call_count(), 7);
    }

    #[test]
    fn failures_are_skipped() {
        let renderer = Arc::new(ScriptedRenderer::new(7).failing([3]));
        let (cache, clock) = setup(&renderer, 7);
        let scheduler = PreloadScheduler::new(cache.clone(), clock.clone(), quick(2));

        let report = scheduler.run(clock.current(), 7);

        assert_eq!(report.batches, 4);
        assert_eq!(report.rendered, 6);
        assert_eq!(report.failed, 1);
        assert!(!cache.contains(clock.current(), 3));
        assert!(cache.contains(clock.current(), 7));
    }

    #[test]
    fn document_change_stops_further_batches() {
        let clock = EpochClock::new();
        let epoch = clock.advance();
        let bump = clock.clone();
        let renderer = Arc::new(ScriptedRenderer::new(7).on_render(move |page| {
            if page == 2 {
                bump.advance();
            }
        }));
        let cache = Arc::new(PageImageCache::new(64));
        cache.begin_epoch(epoch, renderer.clone(), 7, 1.0);
        let scheduler = PreloadScheduler::new(cache, clock, quick(2));

        let report = scheduler.run(epoch, 7);

        assert_eq!(report.batches, 1);
        assert!(report.cancelled);
        let mut calls = renderer.calls();
        calls.sort_unstable();
        assert_eq!(calls, vec![1, 2]);
    }

    #[test]
    fn batches_are_spaced_by_the_delay() {
        let renderer = Arc::new(ScriptedRenderer::new(7));
        let (cache, clock) = setup(&renderer, 7);
        let config = PreloadConfig {
            batch_size: 2,
            batch_delay: Duration::from_millis(20),
        };
        let scheduler = PreloadScheduler::new(cache, clock.clone(), config);

        let started = Instant::now();
        let report = scheduler.run(clock.current(), 7);

        assert_eq!(report.batches, 4);
        // Three gaps between four batches
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn no_pause_after_the_last_batch() {
        let renderer = Arc::new(ScriptedRenderer::new(2));
        let (cache, clock) = setup(&renderer, 2);
        let config = PreloadConfig {
            batch_size: 2,
            batch_delay: Duration::from_secs(3),
        };
        let scheduler = PreloadScheduler::new(cache, clock.clone(), config);

        let started = Instant::now();
        let report = scheduler.run(clock.current(), 2);

        assert_eq!(report.batches, 1);
        assert_eq!(report.rendered, 2);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn zero_batch_size_is_treated_as_one() {
        let renderer = Arc::new(ScriptedRenderer::new(3));
        let (cache, clock) = setup(&renderer, 3);
        let scheduler = PreloadScheduler::new(cache, clock.clone(), quick(0));

        assert_eq!(scheduler.run(clock.current(), 3).batches, 3);
    }

    #[test]
    fn spawned_sweep_reports_back() {
        let renderer = Arc::new(ScriptedRenderer::new(5));
        let (cache, clock) = setup(&renderer, 5);
        let scheduler =
            PreloadScheduler::new(cache.clone(), clock.clone(), PreloadConfig::default());

        let handle = scheduler.spawn(clock.current(), 5);
        assert_eq!(handle.run_id(), clock.current());
        let report = handle.join().expect("preload thread");

        assert_eq!(report.batches, 3);
        assert_eq!(report.rendered, 5);
        assert_eq!(cache.len(), 5);
    }
}
