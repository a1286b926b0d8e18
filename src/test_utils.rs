pub mod test_helpers {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Condvar, Mutex, PoisonError};
    use std::time::Duration;

    use flume::{Receiver, Sender};

    use crate::pdf::{
        DocumentInfo, DocumentLoadError, DocumentLocation, DocumentSource, OpenedDocument,
        PageBitmap, PageNumber, PageRenderer, RenderError,
    };

    type RenderHook = Box<dyn Fn(PageNumber) + Send + Sync>;

    /// Renderer for tests: counts calls, fails chosen pages, and can hold
    /// renders in flight until the test releases them.
    pub struct ScriptedRenderer {
        page_count: u32,
        failing: Mutex<HashSet<PageNumber>>,
        calls: Mutex<Vec<PageNumber>>,
        call_count: AtomicUsize,
        gate: Option<Gate>,
        started_tx: Sender<PageNumber>,
        started_rx: Receiver<PageNumber>,
        hook: Option<RenderHook>,
    }

    struct Gate {
        open: Mutex<bool>,
        cond: Condvar,
    }

    impl ScriptedRenderer {
        pub fn new(page_count: u32) -> Self {
            let (started_tx, started_rx) = flume::unbounded();
            Self {
                page_count,
                failing: Mutex::new(HashSet::new()),
                calls: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
                gate: None,
                started_tx,
                started_rx,
                hook: None,
            }
        }

        /// Make these pages fail until [`ScriptedRenderer::heal`] is called
        pub fn failing(self, pages: impl IntoIterator<Item = PageNumber>) -> Self {
            self.failing
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(pages);
            self
        }

        /// Hold every render until [`ScriptedRenderer::release`] is called
        pub fn gated(mut self) -> Self {
            self.gate = Some(Gate {
                open: Mutex::new(false),
                cond: Condvar::new(),
            });
            self
        }

        /// Run `hook` at the start of every render
        pub fn on_render(mut self, hook: impl Fn(PageNumber) + Send + Sync + 'static) -> Self {
            self.hook = Some(Box::new(hook));
            self
        }

        pub fn release(&self) {
            if let Some(gate) = &self.gate {
                *gate.open.lock().unwrap_or_else(PoisonError::into_inner) = true;
                gate.cond.notify_all();
            }
        }

        pub fn heal(&self, page: PageNumber) {
            self.failing
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&page);
        }

        /// Block until some render has started, returning its page
        pub fn wait_started(&self, timeout: Duration) -> Option<PageNumber> {
            self.started_rx.recv_timeout(timeout).ok()
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn calls(&self) -> Vec<PageNumber> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn calls_for(&self, page: PageNumber) -> usize {
            self.calls().iter().filter(|p| **p == page).count()
        }

        fn wait_for_gate(&self) {
            let Some(gate) = &self.gate else {
                return;
            };
            let mut open = gate.open.lock().unwrap_or_else(PoisonError::into_inner);
            while !*open {
                open = gate
                    .cond
                    .wait(open)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }

    impl PageRenderer for ScriptedRenderer {
        fn render_page(&self, page: PageNumber, scale: f32) -> Result<PageBitmap, RenderError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(page);
            let _ = self.started_tx.send(page);

            if let Some(hook) = &self.hook {
                hook(page);
            }
            self.wait_for_gate();

            if page == 0 || page > self.page_count {
                return Err(RenderError::PageOutOfRange {
                    page,
                    page_count: self.page_count,
                });
            }
            if self
                .failing
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&page)
            {
                return Err(RenderError::Malformed {
                    page,
                    detail: "scripted failure".to_string(),
                });
            }

            let width = ((4.0 * scale).round() as u32).max(1);
            let height = ((6.0 * scale).round() as u32).max(1);
            let pixels = vec![page as u8; (width * height * 3) as usize];
            Ok(PageBitmap::new(page, width, height, pixels))
        }
    }

    /// Document source serving pre-registered scripted documents
    #[derive(Default)]
    pub struct ScriptedSource {
        documents: Mutex<HashMap<DocumentLocation, (DocumentInfo, Arc<ScriptedRenderer>)>>,
    }

    impl ScriptedSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_document(
            self,
            location: DocumentLocation,
            renderer: Arc<ScriptedRenderer>,
            aspect_ratio: f32,
        ) -> Self {
            let info = DocumentInfo {
                page_count: renderer.page_count,
                first_page_aspect_ratio: aspect_ratio,
            };
            self.documents
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(location, (info, renderer));
            self
        }
    }

    impl DocumentSource for ScriptedSource {
        fn open(&self, location: &DocumentLocation) -> Result<OpenedDocument, DocumentLoadError> {
            let documents = self
                .documents
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let Some((info, renderer)) = documents.get(location) else {
                return Err(DocumentLoadError::NotFound {
                    path: location.to_string(),
                });
            };
            let renderer: Arc<dyn PageRenderer> = renderer.clone();
            Ok(OpenedDocument {
                info: *info,
                renderer,
            })
        }
    }

    /// Shorthand for a path location
    pub fn doc(name: &str) -> DocumentLocation {
        DocumentLocation::Path(name.into())
    }
}
