//! Capabilities the engine consumes from the outside world

use std::path::PathBuf;
use std::sync::Arc;

use super::error::{DocumentLoadError, RenderError};
use super::types::{DocumentInfo, PageBitmap, PageNumber};

/// Rasterizes pages of one opened document.
///
/// Implementations must be callable from several threads at once; the
/// cache guarantees it never asks for the same page twice concurrently.
pub trait PageRenderer: Send + Sync {
    fn render_page(&self, page: PageNumber, scale: f32) -> Result<PageBitmap, RenderError>;
}

/// Where a document comes from
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DocumentLocation {
    Path(PathBuf),
    Url(String),
}

impl std::fmt::Display for DocumentLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentLocation::Path(path) => write!(f, "{}", path.display()),
            DocumentLocation::Url(url) => f.write_str(url),
        }
    }
}

/// A successfully opened document
pub struct OpenedDocument {
    pub info: DocumentInfo,
    pub renderer: Arc<dyn PageRenderer>,
}

impl std::fmt::Debug for OpenedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedDocument")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Opens documents and hands back a renderer bound to them
pub trait DocumentSource: Send + Sync {
    fn open(&self, location: &DocumentLocation) -> Result<OpenedDocument, DocumentLoadError>;
}
