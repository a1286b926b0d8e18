//! Flipbook engine: page cache, spread layout, preload and page turns

mod cache;
mod epoch;
mod error;
mod flip;
mod preload;
#[cfg(feature = "pdf")]
mod request;
mod scale;
mod source;
mod spread;
mod state;
mod types;
mod viewer;
#[cfg(feature = "pdf")]
mod worker;

pub use cache::PageImageCache;
pub use epoch::EpochClock;
pub use error::{DocumentLoadError, RenderError, ResolveError};
pub use flip::{FlipEngine, FlipEvent, FlipStart};
pub use preload::{
    DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, PreloadConfig, PreloadHandle, PreloadReport,
    PreloadScheduler,
};
pub use scale::RenderScale;
pub use source::{DocumentLocation, DocumentSource, OpenedDocument, PageRenderer};
pub use spread::{Spread, pages_of, spread_count, spreads};
pub use state::{
    Command, Effect, Face, FlipPhase, FlipRequest, FlipState, FlipTransition, NavigationState,
    PREP_FRAMES, ResolvedPages, SWIPE_THRESHOLD_PX, Ticket, TransitionKey, TurningSheet,
    UnderLayer,
};
pub use types::*;
pub use viewer::{
    BaseLayer, DEFAULT_CACHE_CAPACITY, FALLBACK_ASPECT_RATIO, FlipLayer, Layers, PageSlot, Viewer,
    ViewerConfig, ViewerStatus,
};
#[cfg(feature = "pdf")]
pub use worker::{DEFAULT_WORKERS, MupdfRenderer, MupdfSource};
