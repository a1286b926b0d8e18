//! Flip engine - drives navigation state and resolves flip pages off-thread

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};

use super::cache::PageImageCache;
use super::error::{RenderError, ResolveError};
use super::state::{
    Command, Effect, FlipRequest, NavigationState, ResolvedPages, Ticket, TransitionKey,
};
use super::types::{Epoch, FlipDirection, PageNumber};

/// What `start_flip` did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlipStart {
    /// Lock taken, pages are being resolved
    Resolving(Ticket),
    /// Mobile mode moved straight to this page
    MobilePage(PageNumber),
    /// Nothing to do (boundary, not ready, or a flip is already running)
    Ignored,
}

/// Outcome of a flip resolution, reported by `poll` / `wait_resolution`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlipEvent {
    /// All pages ready, overlay mounted in its prep phase
    Mounted(TransitionKey),
    /// A page could not be rendered; the lock has been released
    Failed { ticket: Ticket, error: ResolveError },
}

struct Resolution {
    epoch: Epoch,
    ticket: Ticket,
    result: Result<ResolvedPages, ResolveError>,
}

/// Runs desktop page turns and mobile single-page steps.
///
/// Owns the [`NavigationState`]; every transition goes through
/// [`NavigationState::apply`] and the returned effects are executed here.
pub struct FlipEngine {
    state: NavigationState,
    cache: Arc<PageImageCache>,
    epoch: Epoch,
    resolution_tx: Sender<Resolution>,
    resolution_rx: Receiver<Resolution>,
}

impl FlipEngine {
    #[must_use]
    pub fn new(cache: Arc<PageImageCache>) -> Self {
        let (resolution_tx, resolution_rx) = flume::unbounded();
        Self {
            state: NavigationState::new(),
            cache,
            epoch: 0,
            resolution_tx,
            resolution_rx,
        }
    }

    #[must_use]
    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Start over for a new document
    pub fn load(&mut self, epoch: Epoch, page_count: u32) {
        self.epoch = epoch;
        self.apply_command(Command::Load { page_count });
    }

    /// Forget the document; results of in-flight resolutions will be dropped
    pub fn unload(&mut self, epoch: Epoch) {
        self.epoch = epoch;
        self.apply_command(Command::Unload);
    }

    pub fn set_mobile(&mut self, mobile: bool) {
        self.apply_command(Command::SetMobile(mobile));
    }

    /// Request a page turn. Never blocks.
    pub fn start_flip(&mut self, direction: FlipDirection) -> FlipStart {
        let effects = self.state.apply(Command::RequestFlip(direction));
        let mut outcome = FlipStart::Ignored;

        for effect in effects {
            match effect {
                Effect::ResolvePages(request) => {
                    debug!(
                        "Flip {} requested: spread {} -> {} (ticket {})",
                        direction, request.from.index, request.to.index, request.ticket
                    );
                    self.spawn_resolution(request);
                    outcome = FlipStart::Resolving(request.ticket);
                }
                Effect::ShowMobilePage(page) => {
                    debug!("Mobile {direction} to page {page}");
                    outcome = FlipStart::MobilePage(page);
                }
                other => self.execute_effect(other),
            }
        }

        outcome
    }

    /// Drain finished resolutions without blocking
    pub fn poll(&mut self) -> Vec<FlipEvent> {
        let mut events = vec![];
        while let Ok(resolution) = self.resolution_rx.try_recv() {
            events.extend(self.handle_resolution(resolution));
        }
        events
    }

    /// Block until the pending resolution lands or `timeout` passes.
    ///
    /// Returns `None` right away when nothing is being resolved.
    pub fn wait_resolution(&mut self, timeout: Duration) -> Option<FlipEvent> {
        let deadline = Instant::now() + timeout;
        while self.state.is_resolving() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.resolution_rx.recv_timeout(remaining) {
                Ok(resolution) => {
                    if let Some(event) = self.handle_resolution(resolution) {
                        return Some(event);
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
        None
    }

    /// The shell painted a frame. Returns the key once rotation should start.
    pub fn on_animation_frame(&mut self) -> Option<TransitionKey> {
        self.state
            .apply(Command::AnimationFrame)
            .into_iter()
            .find_map(|effect| match effect {
                Effect::StartRotation(key) => Some(key),
                _ => None,
            })
    }

    /// The turning sheet finished rotating. Returns the committed spread.
    pub fn on_transition_settled(&mut self) -> Option<usize> {
        let mut committed = None;
        for effect in self.state.apply(Command::TransitionSettled) {
            match effect {
                Effect::CommitSpread(index) => {
                    debug!("Committed spread {index}");
                    committed = Some(index);
                }
                other => self.execute_effect(other),
            }
        }
        committed
    }

    fn apply_command(&mut self, cmd: Command) {
        let effects = self.state.apply(cmd);
        for effect in effects {
            self.execute_effect(effect);
        }
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::ReleaseLock => debug!("Navigation lock released"),
            Effect::MountOverlay(key) => debug!("Overlay mounted for {key}"),
            Effect::StartRotation(key) => debug!("Rotation started for {key}"),
            Effect::CommitSpread(index) => debug!("Committed spread {index}"),
            Effect::ShowMobilePage(page) => debug!("Showing page {page}"),
            Effect::ResolvePages(request) => self.spawn_resolution(request),
        }
    }

    fn spawn_resolution(&mut self, request: FlipRequest) {
        let cache = Arc::clone(&self.cache);
        let tx = self.resolution_tx.clone();
        let epoch = self.epoch;

        let spawned = thread::Builder::new()
            .name(format!("flipbook-flip-{}", request.ticket))
            .spawn(move || {
                let result = resolve_pages(&cache, epoch, request.pages());
                let _ = tx.send(Resolution {
                    epoch,
                    ticket: request.ticket,
                    result,
                });
            });

        if let Err(e) = spawned {
            let _ = self.resolution_tx.send(Resolution {
                epoch,
                ticket: request.ticket,
                result: Err(RenderError::engine(format!("could not spawn resolver: {e}")).into()),
            });
        }
    }

    fn handle_resolution(&mut self, resolution: Resolution) -> Option<FlipEvent> {
        let Resolution {
            epoch,
            ticket,
            result,
        } = resolution;

        if epoch != self.epoch {
            debug!("Dropping flip resolution for epoch {epoch} (now {})", self.epoch);
            return None;
        }

        match result {
            Ok(pages) => self
                .state
                .apply(Command::PagesResolved { ticket, pages })
                .into_iter()
                .find_map(|effect| match effect {
                    Effect::MountOverlay(key) => {
                        debug!("Overlay mounted for {key}");
                        Some(FlipEvent::Mounted(key))
                    }
                    _ => None,
                }),
            Err(error) => {
                let effects = self.state.apply(Command::ResolveFailed { ticket });
                if !effects.contains(&Effect::ReleaseLock) {
                    return None;
                }
                warn!("Flip {ticket} failed: {error}");
                Some(FlipEvent::Failed { ticket, error })
            }
        }
    }
}

/// Render every page of a flip concurrently. Waits for all of them and fails
/// if any page fails, reporting the failed page that comes first in `pages`.
fn resolve_pages(
    cache: &PageImageCache,
    epoch: Epoch,
    pages: [Option<PageNumber>; 4],
) -> Result<ResolvedPages, ResolveError> {
    let [from_left, from_right, to_left, to_right] = thread::scope(|s| {
        let renders = pages.map(|page| page.map(|p| s.spawn(move || cache.render(epoch, p))));
        renders.map(|render| match render {
            None => Ok(None),
            Some(render) => render
                .join()
                .unwrap_or_else(|_| Err(RenderError::engine("renderer panicked").into()))
                .map(Some),
        })
    });

    Ok(ResolvedPages::from_array([
        from_left?, from_right?, to_left?, to_right?,
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::state::FlipPhase;
    use crate::test_utils::test_helpers::ScriptedRenderer;

    const WAIT: Duration = Duration::from_secs(5);

    fn engine(renderer: &Arc<ScriptedRenderer>, pages: u32) -> FlipEngine {
        let cache = Arc::new(PageImageCache::new(64));
        cache.begin_epoch(1, renderer.clone(), pages, 1.0);
        let mut engine = FlipEngine::new(cache);
        engine.load(1, pages);
        engine
    }

    #[test]
    fn resolution_waits_for_all_pages_before_failing() {
        let renderer = Arc::new(ScriptedRenderer::new(6).failing([1, 3]));
        let cache = PageImageCache::new(8);
        cache.begin_epoch(1, renderer.clone(), 6, 1.0);

        let err = resolve_pages(&cache, 1, [None, Some(1), Some(2), Some(3)]).unwrap_err();

        assert!(matches!(
            err,
            ResolveError::Render(RenderError::Malformed { page: 1, .. })
        ));
        let mut calls = renderer.calls();
        calls.sort_unstable();
        assert_eq!(calls, vec![1, 2, 3]);
        assert!(cache.contains(1, 2));
    }

    #[test]
    fn flip_resolves_then_runs_to_commit() {
        let renderer = Arc::new(ScriptedRenderer::new(6));
        let mut engine = engine(&renderer, 6);

        let FlipStart::Resolving(ticket) = engine.start_flip(FlipDirection::Next) else {
            panic!("expected a resolving flip");
        };
        let Some(FlipEvent::Mounted(key)) = engine.wait_resolution(WAIT) else {
            panic!("expected the overlay to mount");
        };
        assert_eq!(key.ticket, ticket);
        assert_eq!((key.from, key.to), (0, 1));

        let transition = engine.state().flip.transition().unwrap();
        assert_eq!(transition.phase, FlipPhase::Prep);
        assert_eq!(transition.sheet.front.page, Some(1));
        assert_eq!(transition.sheet.back.page, Some(2));
        assert!(transition.sheet.back.bitmap.is_some());

        assert_eq!(engine.on_animation_frame(), None);
        assert_eq!(engine.on_animation_frame(), Some(key));
        assert_eq!(engine.on_transition_settled(), Some(1));
        assert_eq!(engine.state().spread_index, 1);
        assert!(!engine.state().nav_lock);

        let mut calls = renderer.calls();
        calls.sort_unstable();
        assert_eq!(calls, vec![1, 2, 3]);
    }

    #[test]
    fn second_start_while_resolving_is_ignored() {
        let renderer = Arc::new(ScriptedRenderer::new(6).gated());
        let mut engine = engine(&renderer, 6);

        assert!(matches!(
            engine.start_flip(FlipDirection::Next),
            FlipStart::Resolving(_)
        ));
        assert!(renderer.wait_started(WAIT).is_some());
        assert_eq!(engine.start_flip(FlipDirection::Next), FlipStart::Ignored);
        assert!(engine.poll().is_empty());

        renderer.release();
        assert!(matches!(
            engine.wait_resolution(WAIT),
            Some(FlipEvent::Mounted(_))
        ));
    }

    #[test]
    fn failure_releases_lock_and_keeps_spread() {
        let renderer = Arc::new(ScriptedRenderer::new(6).failing([2]));
        let mut engine = engine(&renderer, 6);

        let FlipStart::Resolving(ticket) = engine.start_flip(FlipDirection::Next) else {
            panic!("expected a resolving flip");
        };
        match engine.wait_resolution(WAIT) {
            Some(FlipEvent::Failed { ticket: t, error }) => {
                assert_eq!(t, ticket);
                assert!(!error.is_stale());
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(engine.state().spread_index, 0);
        assert!(!engine.state().nav_lock);
        assert!(!engine.state().flip.is_active());
        assert!(engine.state().can_go_next());
    }

    #[test]
    fn resolution_for_previous_document_is_dropped() {
        let renderer = Arc::new(ScriptedRenderer::new(6).gated());
        let mut engine = engine(&renderer, 6);

        assert!(matches!(
            engine.start_flip(FlipDirection::Next),
            FlipStart::Resolving(_)
        ));
        assert!(renderer.wait_started(WAIT).is_some());

        engine.cache.clear(2);
        engine.load(2, 6);
        renderer.release();

        assert_eq!(engine.wait_resolution(Duration::from_millis(50)), None);
        thread::sleep(Duration::from_millis(50));
        assert!(engine.poll().is_empty());
        assert!(!engine.state().flip.is_active());
        assert!(!engine.state().nav_lock);
    }

    #[test]
    fn mobile_steps_do_not_resolve() {
        let renderer = Arc::new(ScriptedRenderer::new(3));
        let mut engine = engine(&renderer, 3);
        engine.set_mobile(true);

        assert_eq!(
            engine.start_flip(FlipDirection::Next),
            FlipStart::MobilePage(2)
        );
        assert_eq!(engine.wait_resolution(WAIT), None);
        assert_eq!(renderer.call_count(), 0);
    }

    #[test]
    fn wait_without_pending_returns_immediately() {
        let renderer = Arc::new(ScriptedRenderer::new(3));
        let mut engine = engine(&renderer, 3);

        let started = Instant::now();
        assert_eq!(engine.wait_resolution(WAIT), None);
        assert!(started.elapsed() < WAIT);
    }
}
