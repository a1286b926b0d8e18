//! MuPDF-backed document source and its render worker pool

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use flume::{Receiver, Sender};
use log::{debug, error};
use mupdf::{Colorspace, Document, Matrix, Pixmap};

use super::error::{DocumentLoadError, RenderError};
use super::request::RenderRequest;
use super::source::{DocumentLocation, DocumentSource, OpenedDocument, PageRenderer};
use super::types::{DocumentInfo, PageBitmap, PageNumber};

pub const DEFAULT_WORKERS: usize = 2;

/// Opens local PDF files and renders them on a pool of worker threads
#[derive(Clone, Debug)]
pub struct MupdfSource {
    workers: usize,
}

impl Default for MupdfSource {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl MupdfSource {
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }
}

impl DocumentSource for MupdfSource {
    fn open(&self, location: &DocumentLocation) -> Result<OpenedDocument, DocumentLoadError> {
        let path = match location {
            DocumentLocation::Path(path) => path,
            DocumentLocation::Url(url) => {
                return Err(DocumentLoadError::Unsupported {
                    detail: format!("remote documents are not supported: {url}"),
                });
            }
        };
        if !path.exists() {
            return Err(DocumentLoadError::NotFound {
                path: path.display().to_string(),
            });
        }

        let info = load_document_info(path)?;
        let renderer = MupdfRenderer::spawn(path.clone(), self.workers);

        Ok(OpenedDocument {
            info,
            renderer: Arc::new(renderer),
        })
    }
}

fn load_document_info(path: &Path) -> Result<DocumentInfo, DocumentLoadError> {
    let doc = Document::open(path.to_string_lossy().as_ref()).map_err(|e| {
        DocumentLoadError::Parse {
            detail: e.to_string(),
        }
    })?;
    let page_count = u32::try_from(doc.page_count()?).unwrap_or(0);

    let first_page_aspect_ratio = if page_count > 0 {
        let bounds = doc.load_page(0)?.bounds()?;
        let (width, height) = (bounds.x1 - bounds.x0, bounds.y1 - bounds.y0);
        if height > 0.0 { width / height } else { 0.0 }
    } else {
        0.0
    };

    Ok(DocumentInfo {
        page_count,
        first_page_aspect_ratio,
    })
}

/// Handle to the worker pool of one opened document.
///
/// MuPDF documents are not `Send`, so every worker opens its own copy and
/// pulls requests from a shared queue. Dropping the handle stops the pool.
pub struct MupdfRenderer {
    request_tx: Sender<RenderRequest>,
    num_workers: usize,
}

impl MupdfRenderer {
    fn spawn(doc_path: PathBuf, num_workers: usize) -> Self {
        // flume channels are MPMC: every worker clones the receiver
        let (request_tx, request_rx) = flume::unbounded();

        for n in 0..num_workers {
            let path = doc_path.clone();
            let rx = request_rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("flipbook-render-{n}"))
                .spawn(move || render_worker(&path, rx));
            if let Err(e) = spawned {
                error!("Could not start render worker {n}: {e}");
            }
        }

        Self {
            request_tx,
            num_workers,
        }
    }

    fn shutdown(&self) {
        for _ in 0..self.num_workers {
            let _ = self.request_tx.send(RenderRequest::Shutdown);
        }
    }
}

impl PageRenderer for MupdfRenderer {
    fn render_page(&self, page: PageNumber, scale: f32) -> Result<PageBitmap, RenderError> {
        let (reply, reply_rx) = flume::bounded(1);
        self.request_tx
            .send(RenderRequest::Page { page, scale, reply })
            .map_err(|_| RenderError::WorkerGone)?;
        reply_rx.recv().map_err(|_| RenderError::WorkerGone)?
    }
}

impl Drop for MupdfRenderer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Main worker function - runs in a dedicated thread
#[expect(
    clippy::needless_pass_by_value,
    reason = "Receiver moved into thread, need ownership"
)]
fn render_worker(doc_path: &Path, requests: Receiver<RenderRequest>) {
    let doc = match Document::open(doc_path.to_string_lossy().as_ref()) {
        Ok(d) => d,
        Err(e) => {
            error!("Render worker could not open {doc_path:?}: {e}");
            return;
        }
    };

    for request in requests {
        match request {
            RenderRequest::Page { page, scale, reply } => {
                let _ = reply.send(render_page(&doc, page, scale));
            }
            RenderRequest::Shutdown => break,
        }
    }
    debug!("Render worker for {doc_path:?} stopped");
}

/// Render a single page to packed RGB on a white background
fn render_page(doc: &Document, page: PageNumber, scale: f32) -> Result<PageBitmap, RenderError> {
    let page_count = u32::try_from(doc.page_count()?).unwrap_or(0);
    if page == 0 || page > page_count {
        return Err(RenderError::PageOutOfRange { page, page_count });
    }

    let malformed = |e: mupdf::error::Error| RenderError::Malformed {
        page,
        detail: e.to_string(),
    };
    let loaded = doc.load_page((page - 1) as i32).map_err(malformed)?;
    let pixmap = loaded
        .to_pixmap(
            &Matrix::new_scale(scale, scale),
            &Colorspace::device_rgb(),
            false,
            false,
        )
        .map_err(malformed)?;

    RasterRows::of(&pixmap).into_bitmap(page)
}

/// Rows of a rendered pixmap as MuPDF lays them out: `channels` bytes per
/// pixel, each row padded to `stride` bytes
struct RasterRows<'a> {
    samples: &'a [u8],
    width: u32,
    height: u32,
    channels: usize,
    stride: usize,
}

impl<'a> RasterRows<'a> {
    fn of(pixmap: &'a Pixmap) -> Self {
        Self {
            samples: pixmap.samples(),
            width: pixmap.width(),
            height: pixmap.height(),
            channels: pixmap.n() as usize,
            stride: pixmap.stride() as usize,
        }
    }

    /// Strip row padding and everything past the RGB channels
    fn into_bitmap(self, page: PageNumber) -> Result<PageBitmap, RenderError> {
        let malformed = |detail: String| RenderError::Malformed { page, detail };
        let row_len = self.width as usize * self.channels;
        if self.channels < 3 || self.stride == 0 || row_len > self.stride {
            return Err(malformed(format!(
                "unexpected pixmap layout: {} channels, {} pixels in {} byte rows",
                self.channels, self.width, self.stride
            )));
        }

        let height = self.height as usize;
        let mut pixels = Vec::with_capacity(self.width as usize * height * 3);
        let mut rows = 0;
        for row in self.samples.chunks(self.stride).take(height) {
            let Some(row) = row.get(..row_len) else {
                break;
            };
            pixels.extend(row.chunks_exact(self.channels).flat_map(|px| &px[..3]));
            rows += 1;
        }
        if rows < height {
            return Err(malformed(format!("pixmap holds {rows} of {height} rows")));
        }

        Ok(PageBitmap::new(page, self.width, self.height, pixels))
    }
}
