//! Shell-facing viewer: document lifecycle, navigation and render layers

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{info, warn};

use super::cache::PageImageCache;
use super::epoch::EpochClock;
use super::error::{DocumentLoadError, RenderError, ResolveError};
use super::flip::{FlipEngine, FlipEvent, FlipStart};
use super::preload::{PreloadConfig, PreloadHandle, PreloadReport, PreloadScheduler};
use super::scale::RenderScale;
use super::source::{DocumentLocation, DocumentSource};
use super::spread::{self, Spread};
use super::state::{Face, FlipPhase, TransitionKey};
use super::types::{Bitmap, DocumentSession, Epoch, FlipDirection, PageNumber, ViewMode};
use crate::settings::Settings;

/// Width / height used when a document reports no usable page size
pub const FALLBACK_ASPECT_RATIO: f32 = 0.77;

pub const DEFAULT_CACHE_CAPACITY: usize = 512;

#[derive(Clone, Debug, PartialEq)]
pub struct ViewerConfig {
    /// `None` disables the background sweep
    pub preload: Option<PreloadConfig>,
    pub render_scale: RenderScale,
    pub device_pixel_ratio: f32,
    pub fallback_aspect_ratio: f32,
    pub cache_capacity: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            preload: Some(PreloadConfig::default()),
            render_scale: RenderScale::default(),
            device_pixel_ratio: 1.0,
            fallback_aspect_ratio: FALLBACK_ASPECT_RATIO,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl ViewerConfig {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            preload: settings.preload_enabled.then(|| PreloadConfig {
                batch_size: settings.preload_batch_size.max(1),
                batch_delay: Duration::from_millis(settings.preload_batch_delay_ms),
            }),
            render_scale: RenderScale::new(
                settings.render_base_scale,
                settings.max_device_pixel_ratio,
            ),
            device_pixel_ratio: 1.0,
            fallback_aspect_ratio: settings.fallback_aspect_ratio,
            cache_capacity: settings.cache_capacity.max(1),
        }
    }

    #[must_use]
    pub fn with_device_pixel_ratio(mut self, dpr: f32) -> Self {
        self.device_pixel_ratio = dpr;
        self
    }

    fn fallback_aspect(&self) -> f32 {
        if self.fallback_aspect_ratio.is_finite() && self.fallback_aspect_ratio > 0.0 {
            self.fallback_aspect_ratio
        } else {
            FALLBACK_ASPECT_RATIO
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewerStatus {
    Idle,
    Loading,
    Ready,
    Failed(String),
}

/// One page position on screen
#[derive(Clone, Debug)]
pub enum PageSlot {
    /// Nothing goes on this side
    Placeholder,
    /// Page not rendered yet
    Pending(PageNumber),
    Ready(PageNumber, Bitmap),
}

impl PageSlot {
    #[must_use]
    pub fn page(&self) -> Option<PageNumber> {
        match self {
            PageSlot::Placeholder => None,
            PageSlot::Pending(page) | PageSlot::Ready(page, _) => Some(*page),
        }
    }

    #[must_use]
    pub fn bitmap(&self) -> Option<&Bitmap> {
        match self {
            PageSlot::Ready(_, bitmap) => Some(bitmap),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, PageSlot::Ready(..))
    }

    fn from_face(face: &Face) -> Self {
        match (face.page, &face.bitmap) {
            (None, _) => PageSlot::Placeholder,
            (Some(page), Some(bitmap)) => PageSlot::Ready(page, Arc::clone(bitmap)),
            (Some(page), None) => PageSlot::Pending(page),
        }
    }
}

/// Static pages of the committed view
#[derive(Clone, Debug)]
pub enum BaseLayer {
    /// No document
    Empty,
    /// Desktop spread
    Spread { left: PageSlot, right: PageSlot },
    /// Mobile single page
    Single(PageSlot),
}

/// Overlay shown while a page turn is in progress
#[derive(Clone, Debug)]
pub struct FlipLayer {
    pub key: TransitionKey,
    pub phase: FlipPhase,
    pub under_left: PageSlot,
    pub under_right: PageSlot,
    pub front: PageSlot,
    pub back: PageSlot,
}

#[derive(Clone, Debug)]
pub struct Layers {
    pub base: BaseLayer,
    pub flip: Option<FlipLayer>,
}

/// A magazine viewer bound to one document source.
///
/// Owns the page cache, the background preload sweep and the flip engine,
/// and keeps them on the same epoch.
pub struct Viewer {
    source: Arc<dyn DocumentSource>,
    config: ViewerConfig,
    clock: EpochClock,
    cache: Arc<PageImageCache>,
    flip: FlipEngine,
    status: ViewerStatus,
    session: Option<DocumentSession>,
    preload: Option<PreloadHandle>,
}

impl Viewer {
    #[must_use]
    pub fn new(source: Arc<dyn DocumentSource>, config: ViewerConfig) -> Self {
        let cache = Arc::new(PageImageCache::new(config.cache_capacity));
        Self {
            source,
            flip: FlipEngine::new(Arc::clone(&cache)),
            cache,
            config,
            clock: EpochClock::new(),
            status: ViewerStatus::Idle,
            session: None,
            preload: None,
        }
    }

    /// Open a document, replacing the current one
    pub fn open(
        &mut self,
        location: &DocumentLocation,
    ) -> Result<DocumentSession, DocumentLoadError> {
        let epoch = self.reset_document();
        self.status = ViewerStatus::Loading;
        info!("Opening {location} (epoch {epoch})");

        let opened = match self.source.open(location) {
            Ok(opened) => opened,
            Err(e) => {
                warn!("Failed to open {location}: {e}");
                self.status = ViewerStatus::Failed(e.to_string());
                return Err(e);
            }
        };

        let page_count = opened.info.page_count;
        let aspect_ratio = match opened.info.first_page_aspect_ratio {
            ratio if ratio.is_finite() && ratio > 0.0 => ratio,
            _ => self.config.fallback_aspect(),
        };
        let render_scale = self
            .config
            .render_scale
            .for_device_pixel_ratio(self.config.device_pixel_ratio);

        self.cache
            .begin_epoch(epoch, opened.renderer, page_count, render_scale);
        self.flip.load(epoch, page_count);

        if let Some(preload) = self.config.preload.filter(|_| page_count > 0) {
            let scheduler =
                PreloadScheduler::new(Arc::clone(&self.cache), self.clock.clone(), preload);
            self.preload = Some(scheduler.spawn(epoch, page_count));
        }

        let session = DocumentSession {
            epoch,
            page_count,
            aspect_ratio,
            render_scale,
        };
        info!(
            "Opened {location}: {page_count} pages, aspect {aspect_ratio:.3}, scale {render_scale:.2}"
        );
        self.session = Some(session.clone());
        self.status = ViewerStatus::Ready;
        Ok(session)
    }

    /// Drop the current document
    pub fn close(&mut self) {
        let epoch = self.reset_document();
        info!("Closed document (epoch {epoch})");
        self.status = ViewerStatus::Idle;
    }

    fn reset_document(&mut self) -> Epoch {
        let epoch = self.clock.advance();
        self.cache.clear(epoch);
        self.flip.unload(epoch);
        self.session = None;
        // The previous sweep notices the new epoch before its next batch
        self.preload = None;
        epoch
    }

    #[must_use]
    pub fn status(&self) -> &ViewerStatus {
        &self.status
    }

    #[must_use]
    pub fn session(&self) -> Option<&DocumentSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.clock.current()
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<PageImageCache> {
        &self.cache
    }

    fn page_count(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.page_count)
    }

    /// Pages of spread `index` in the current document
    #[must_use]
    pub fn spread(&self, index: usize) -> Spread {
        spread::pages_of(self.page_count(), index)
    }

    #[must_use]
    pub fn current_spread(&self) -> Spread {
        self.flip.state().current_spread()
    }

    #[must_use]
    pub fn spread_count(&self) -> usize {
        spread::spread_count(self.page_count())
    }

    #[must_use]
    pub fn mobile_page(&self) -> Option<PageNumber> {
        self.flip.state().visible_mobile_page()
    }

    #[must_use]
    pub fn is_mobile(&self) -> bool {
        self.flip.state().mode == ViewMode::Mobile
    }

    pub fn set_mobile(&mut self, mobile: bool) {
        self.flip.set_mobile(mobile);
    }

    pub fn start_flip(&mut self, direction: FlipDirection) -> FlipStart {
        self.flip.start_flip(direction)
    }

    pub fn next(&mut self) -> FlipStart {
        self.start_flip(FlipDirection::Next)
    }

    pub fn prev(&mut self) -> FlipStart {
        self.start_flip(FlipDirection::Prev)
    }

    /// Click at `x` on a stage `width` wide
    pub fn on_stage_click(&mut self, x: f32, width: f32) -> FlipStart {
        match self.flip.state().intent_for_click(x, width) {
            Some(direction) => self.start_flip(direction),
            None => FlipStart::Ignored,
        }
    }

    /// Touch gesture that ended `dx`/`dy` pixels away from where it began
    pub fn on_swipe(&mut self, dx: f32, dy: f32) -> FlipStart {
        match self.flip.state().intent_for_swipe(dx, dy) {
            Some(direction) => self.start_flip(direction),
            None => FlipStart::Ignored,
        }
    }

    #[must_use]
    pub fn can_go_next(&self) -> bool {
        self.flip.state().can_go_next()
    }

    #[must_use]
    pub fn can_go_prev(&self) -> bool {
        self.flip.state().can_go_prev()
    }

    #[must_use]
    pub fn is_flipping(&self) -> bool {
        self.flip.state().flip.is_active()
    }

    #[must_use]
    pub fn current_label(&self) -> String {
        self.flip.state().label()
    }

    pub fn poll(&mut self) -> Vec<FlipEvent> {
        self.flip.poll()
    }

    pub fn wait_resolution(&mut self, timeout: Duration) -> Option<FlipEvent> {
        self.flip.wait_resolution(timeout)
    }

    pub fn on_animation_frame(&mut self) -> Option<TransitionKey> {
        self.flip.on_animation_frame()
    }

    pub fn on_transition_settled(&mut self) -> Option<usize> {
        self.flip.on_transition_settled()
    }

    /// Wait for the background sweep of the current document to finish
    pub fn wait_for_preload(&mut self) -> Option<PreloadReport> {
        self.preload.take()?.join()
    }

    /// Cached state of a single page, as shown in mobile mode
    #[must_use]
    pub fn page_slot(&self, page: PageNumber) -> PageSlot {
        if page == 0 || page > self.page_count() {
            return PageSlot::Placeholder;
        }
        match self.cache.get(self.clock.current(), page) {
            Some(bitmap) => PageSlot::Ready(page, bitmap),
            None => PageSlot::Pending(page),
        }
    }

    /// What the shell should draw right now
    #[must_use]
    pub fn layers(&self) -> Layers {
        let state = self.flip.state();
        let slot = |page: Option<PageNumber>| match page {
            None => PageSlot::Placeholder,
            Some(page) => self.page_slot(page),
        };

        let base = if !state.ready || state.page_count == 0 {
            BaseLayer::Empty
        } else if state.mode == ViewMode::Mobile {
            BaseLayer::Single(slot(state.visible_mobile_page()))
        } else {
            let current = state.current_spread();
            BaseLayer::Spread {
                left: slot(current.left),
                right: slot(current.right),
            }
        };

        let flip = state.flip.transition().map(|t| FlipLayer {
            key: t.key,
            phase: t.phase,
            under_left: PageSlot::from_face(&t.under.left),
            under_right: PageSlot::from_face(&t.under.right),
            front: PageSlot::from_face(&t.sheet.front),
            back: PageSlot::from_face(&t.sheet.back),
        });

        Layers { base, flip }
    }

    /// Render the pages of the base layer that are not cached yet.
    ///
    /// Does nothing while a page turn is in progress. Returns how many
    /// visible pages are ready.
    pub fn render_visible(&self) -> Result<usize, ResolveError> {
        let state = self.flip.state();
        if !state.ready || state.flip.is_active() {
            return Ok(0);
        }

        let pages: Vec<PageNumber> = if state.mode == ViewMode::Mobile {
            state.visible_mobile_page().into_iter().collect()
        } else {
            state.current_spread().pages().collect()
        };

        let epoch = self.clock.current();
        let cache = &self.cache;
        let outcomes: Vec<Result<Bitmap, ResolveError>> = thread::scope(|s| {
            let renders: Vec<_> = pages
                .iter()
                .map(|&page| s.spawn(move || cache.render(epoch, page)))
                .collect();
            renders
                .into_iter()
                .map(|render| {
                    render
                        .join()
                        .unwrap_or_else(|_| Err(RenderError::engine("renderer panicked").into()))
                })
                .collect()
        });

        let mut ready = 0;
        let mut first_error = None;
        for (page, outcome) in pages.iter().zip(outcomes) {
            match outcome {
                Ok(_) => ready += 1,
                Err(e) => {
                    warn!("Page {page} could not be rendered: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(ready),
        }
    }

    /// Page height for a given width, keeping the document's proportions
    #[must_use]
    pub fn page_height_for(&self, width: u32) -> u32 {
        match &self.session {
            Some(session) => session.page_height_for(width),
            None => (width as f32 / self.config.fallback_aspect()).round() as u32,
        }
    }
}
