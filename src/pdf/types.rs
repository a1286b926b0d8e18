//! Core types shared by the cache, the scheduler and the flip engine

use std::fmt;
use std::sync::Arc;

/// 1-indexed page number inside a document
pub type PageNumber = u32;

/// Identifier of one opened document; bumped whenever the source changes
pub type Epoch = u64;

/// Shared handle to a rendered page
pub type Bitmap = Arc<PageBitmap>;

/// Raw rendered page image.
///
/// Packed RGB pixels (3 bytes per pixel, no row padding). The orchestration
/// layer never looks inside the buffer; it only moves handles around.
#[derive(Clone, PartialEq, Eq)]
pub struct PageBitmap {
    /// Page this bitmap was rendered from
    pub page: PageNumber,
    /// Image width in pixels
    pub width_px: u32,
    /// Image height in pixels
    pub height_px: u32,
    /// Raw RGB pixel data
    pub pixels: Vec<u8>,
}

impl PageBitmap {
    #[must_use]
    pub fn new(page: PageNumber, width_px: u32, height_px: u32, pixels: Vec<u8>) -> Self {
        Self {
            page,
            width_px,
            height_px,
            pixels,
        }
    }

    /// Size of the pixel buffer in bytes
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

impl fmt::Debug for PageBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageBitmap")
            .field("page", &self.page)
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// What a document source reports once a document is open
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DocumentInfo {
    pub page_count: u32,
    /// Width / height of page 1
    pub first_page_aspect_ratio: f32,
}

/// One opened document, as seen by the shell
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSession {
    pub epoch: Epoch,
    pub page_count: u32,
    pub aspect_ratio: f32,
    /// Scale every page of this session is rendered at
    pub render_scale: f32,
}

impl DocumentSession {
    /// Page height matching a given page width, keeping the page's proportions
    #[must_use]
    pub fn page_height_for(&self, width: u32) -> u32 {
        (width as f32 / self.aspect_ratio).round() as u32
    }
}

/// Navigation intent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlipDirection {
    Next,
    Prev,
}

impl FlipDirection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FlipDirection::Next => "next",
            FlipDirection::Prev => "prev",
        }
    }
}

impl fmt::Display for FlipDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Viewport layout the shell is currently using
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Two-page spreads with the page-turn animation
    #[default]
    Desktop,
    /// One page at a time, no animation
    Mobile,
}
