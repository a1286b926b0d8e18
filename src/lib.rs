// Export modules for use in tests
pub mod panic_handler;
pub mod pdf;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export the shell-facing API
pub use pdf::{
    DocumentLocation, DocumentSession, FlipDirection, FlipEvent, FlipStart, Layers, PageSlot,
    Viewer, ViewerConfig, ViewerStatus,
};
