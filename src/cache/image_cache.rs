//! Bounded cache of rendered page images. Rendering happens on a helper
//! thread so a stuck renderer costs the caller only the configured
//! timeout; the orphaned render is left to finish in the background and
//! its result is discarded.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use log::{debug, trace, warn};
use lru::LruCache;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::render::PageRenderer;
use crate::types::{Document, DocumentId, RasterImage};

pub struct ImageCache {
    renderer: Arc<dyn PageRenderer>,
    entries: Mutex<LruCache<(DocumentId, u32), Arc<RasterImage>>>,
    render_timeout: Duration,
}

impl ImageCache {
    pub fn new(renderer: Arc<dyn PageRenderer>, capacity: usize, render_timeout: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            renderer,
            entries: Mutex::new(LruCache::new(capacity)),
            render_timeout,
        }
    }

    /// Returns the rendered image for a page, rendering on miss. Renders
    /// that exceed the timeout fail this lookup only; a later call for the
    /// same page starts a fresh render. Concurrent misses for the same
    /// page may both render; the second insert wins, which is harmless.
    pub fn get(&self, document: &Document, page_number: u32) -> Result<Arc<RasterImage>> {
        let key = (document.id.clone(), page_number);

        if let Some(image) = self.entries.lock().get(&key) {
            trace!("Image cache hit for {} page {}", document.id, page_number);
            return Ok(Arc::clone(image));
        }

        debug!("Image cache miss for {} page {}, rendering", document.id, page_number);
        let image = self.render_bounded(document, page_number)?;

        if image.width() == 0 || image.height() == 0 || image.data().is_empty() {
            return Err(Error::render(format!(
                "Renderer produced empty output for {} page {}", document.id, page_number
            )));
        }

        let image = Arc::new(image);
        self.entries.lock().put(key, Arc::clone(&image));
        Ok(image)
    }

    fn render_bounded(&self, document: &Document, page_number: u32) -> Result<RasterImage> {
        let (sender, receiver) = bounded(1);
        let renderer = Arc::clone(&self.renderer);
        let doc = document.clone();

        std::thread::spawn(move || {
            let result = renderer.render_page(&doc, page_number, None);
            // Receiver may be gone if the caller timed out; the render was
            // wasted work, not an error.
            let _ = sender.send(result);
        });

        match receiver.recv_timeout(self.render_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!("Render of {} page {} exceeded {:?}", document.id, page_number, self.render_timeout);
                Err(Error::render_timeout(format!(
                    "Page {} of {} not rendered within {:?}",
                    page_number, document.id, self.render_timeout
                )))
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::render(format!(
                "Renderer thread died for {} page {}", document.id, page_number
            ))),
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
