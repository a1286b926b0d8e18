//! Error taxonomy of the viewer engine

use super::types::{Epoch, PageNumber};

/// A single page failed to rasterize.
///
/// `Clone` so one failed render can be handed to every caller that was
/// waiting on it.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("page {page} is outside the document (1..={page_count})")]
    PageOutOfRange { page: PageNumber, page_count: u32 },

    #[error("page {page} could not be rasterized: {detail}")]
    Malformed { page: PageNumber, detail: String },

    #[error("PDF engine: {detail}")]
    Engine { detail: String },

    #[error("render worker is gone")]
    WorkerGone,
}

impl RenderError {
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine {
            detail: msg.into(),
        }
    }
}

#[cfg(feature = "pdf")]
impl From<mupdf::error::Error> for RenderError {
    fn from(e: mupdf::error::Error) -> Self {
        Self::engine(e.to_string())
    }
}

/// The document could not be opened or parsed. Terminal for the session.
#[derive(Debug, thiserror::Error)]
pub enum DocumentLoadError {
    #[error("document not found: {path}")]
    NotFound { path: String },

    #[error("document could not be parsed: {detail}")]
    Parse { detail: String },

    #[error("PDF engine: {detail}")]
    Engine { detail: String },

    #[error("unsupported document source: {detail}")]
    Unsupported { detail: String },
}

#[cfg(feature = "pdf")]
impl From<mupdf::error::Error> for DocumentLoadError {
    fn from(e: mupdf::error::Error) -> Self {
        Self::Engine {
            detail: e.to_string(),
        }
    }
}

/// Outcome of asking the cache for a bitmap that could not be produced
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The document changed while the render was in flight
    #[error("render for epoch {epoch} arrived after the document changed (now {current})")]
    StaleEpoch { epoch: Epoch, current: Epoch },
}

impl ResolveError {
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, ResolveError::StaleEpoch { .. })
    }
}
