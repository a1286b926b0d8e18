//! Epoch-tagged, single-flight page image cache

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use flume::{Receiver, Sender};
use log::debug;
use lru::LruCache;

use super::error::{RenderError, ResolveError};
use super::source::PageRenderer;
use super::types::{Bitmap, Epoch, PageBitmap, PageNumber};

type Waiter = Sender<Result<Bitmap, ResolveError>>;

#[derive(Clone)]
struct CacheEntry {
    epoch: Epoch,
    bitmap: Bitmap,
}

struct CacheInner {
    epoch: Epoch,
    page_count: u32,
    scale: f32,
    renderer: Option<Arc<dyn PageRenderer>>,
    entries: LruCache<PageNumber, CacheEntry>,
    /// Pages currently being rendered, with the callers waiting on them
    in_flight: HashMap<PageNumber, Vec<Waiter>>,
}

/// Memoizes one rendered bitmap per page of the current document.
///
/// Every bitmap is produced through [`PageImageCache::render`], which makes
/// sure at most one underlying render per `(epoch, page)` runs at a time;
/// later callers for the same page park until the first one finishes and
/// receive the same result.
pub struct PageImageCache {
    inner: Mutex<CacheInner>,
}

impl PageImageCache {
    /// Create an empty cache holding at most `capacity` pages
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                epoch: 0,
                page_count: 0,
                scale: 1.0,
                renderer: None,
                entries: LruCache::new(
                    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
                ),
                in_flight: HashMap::new(),
            }),
        }
    }

    /// Switch to a new document. Drops every entry and every in-flight
    /// registration of the previous epoch.
    pub fn begin_epoch(
        &self,
        epoch: Epoch,
        renderer: Arc<dyn PageRenderer>,
        page_count: u32,
        scale: f32,
    ) {
        let mut inner = self.lock();
        debug!(
            "Cache epoch {} -> {} ({} pages at scale {:.2})",
            inner.epoch, epoch, page_count, scale
        );
        inner.epoch = epoch;
        inner.page_count = page_count;
        inner.scale = scale;
        inner.renderer = Some(renderer);
        inner.entries.clear();
        inner.in_flight.clear();
    }

    /// Forget the current document entirely
    pub fn clear(&self, epoch: Epoch) {
        let mut inner = self.lock();
        inner.epoch = epoch;
        inner.page_count = 0;
        inner.renderer = None;
        inner.entries.clear();
        inner.in_flight.clear();
    }

    /// Cached bitmap for `page`, or `None` on a miss or a stale epoch
    #[must_use]
    pub fn get(&self, epoch: Epoch, page: PageNumber) -> Option<Bitmap> {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return None;
        }
        inner
            .entries
            .get(&page)
            .filter(|entry| entry.epoch == epoch)
            .map(|entry| Arc::clone(&entry.bitmap))
    }

    /// Return the bitmap for `page`, rendering it on a miss.
    ///
    /// Blocks while the page renders, or while another caller renders it.
    pub fn render(&self, epoch: Epoch, page: PageNumber) -> Result<Bitmap, ResolveError> {
        let (renderer, scale) = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                return Err(ResolveError::StaleEpoch {
                    epoch,
                    current: inner.epoch,
                });
            }

            if let Some(entry) = inner.entries.get(&page) {
                return Ok(Arc::clone(&entry.bitmap));
            }

            if page == 0 || page > inner.page_count {
                return Err(RenderError::PageOutOfRange {
                    page,
                    page_count: inner.page_count,
                }
                .into());
            }

            if let Some(waiters) = inner.in_flight.get_mut(&page) {
                let (tx, rx) = flume::bounded(1);
                waiters.push(tx);
                drop(inner);
                debug!("Page {page} already rendering, waiting for it");
                return self.await_leader(epoch, &rx);
            }

            let Some(renderer) = inner.renderer.clone() else {
                return Err(RenderError::WorkerGone.into());
            };
            inner.in_flight.insert(page, Vec::new());
            (renderer, inner.scale)
        };

        let mut guard = LeaderGuard {
            cache: self,
            epoch,
            page,
            armed: true,
        };
        debug!("Rendering page {page} (epoch {epoch}, scale {scale:.2})");
        let outcome = renderer.render_page(page, scale);
        guard.armed = false;

        self.complete(epoch, page, outcome)
    }

    fn complete(
        &self,
        epoch: Epoch,
        page: PageNumber,
        outcome: Result<PageBitmap, RenderError>,
    ) -> Result<Bitmap, ResolveError> {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            debug!("Dropping page {page} rendered for stale epoch {epoch}");
            return Err(ResolveError::StaleEpoch {
                epoch,
                current: inner.epoch,
            });
        }

        let waiters = inner.in_flight.remove(&page).unwrap_or_default();
        let result = match outcome {
            Ok(bitmap) => {
                let bitmap = Arc::new(bitmap);
                inner.entries.put(
                    page,
                    CacheEntry {
                        epoch,
                        bitmap: Arc::clone(&bitmap),
                    },
                );
                Ok(bitmap)
            }
            Err(e) => {
                debug!("Page {page} failed to render: {e}");
                Err(ResolveError::Render(e))
            }
        };
        drop(inner);

        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        result
    }

    fn await_leader(
        &self,
        epoch: Epoch,
        rx: &Receiver<Result<Bitmap, ResolveError>>,
    ) -> Result<Bitmap, ResolveError> {
        match rx.recv() {
            Ok(result) => result,
            // The registration was dropped: either the document changed or
            // the leading render unwound without completing.
            Err(_) => {
                let current = self.epoch();
                if current == epoch {
                    Err(RenderError::WorkerGone.into())
                } else {
                    Err(ResolveError::StaleEpoch { epoch, current })
                }
            }
        }
    }

    /// Epoch the cache currently serves
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.lock().epoch
    }

    /// Scale pages of the current epoch are rendered at
    #[must_use]
    pub fn scale(&self) -> f32 {
        self.lock().scale
    }

    /// Check if a page is cached for `epoch` without promoting it
    #[must_use]
    pub fn contains(&self, epoch: Epoch, page: PageNumber) -> bool {
        let inner = self.lock();
        inner.epoch == epoch && inner.entries.contains(&page)
    }

    #[must_use]
    pub fn is_in_flight(&self, page: PageNumber) -> bool {
        self.lock().in_flight.contains_key(&page)
    }

    /// Number of cached pages
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().entries.cap().get()
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drops the in-flight registration if the renderer unwinds, so waiters
/// are woken instead of parking forever.
struct LeaderGuard<'a> {
    cache: &'a PageImageCache,
    epoch: Epoch,
    page: PageNumber,
    armed: bool,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.cache.lock();
        if inner.epoch == self.epoch {
            inner.in_flight.remove(&self.page);
        }
    }
}
