//! Messages exchanged with the MuPDF render workers

use flume::Sender;

use super::error::RenderError;
use super::types::{PageBitmap, PageNumber};

/// Where a worker delivers the outcome of one page
pub type RenderReply = Sender<Result<PageBitmap, RenderError>>;

/// Request sent to render workers
#[derive(Debug)]
pub enum RenderRequest {
    /// Rasterize a page at `scale` pixels per point
    Page {
        page: PageNumber,
        scale: f32,
        reply: RenderReply,
    },

    /// Shutdown the worker
    Shutdown,
}
