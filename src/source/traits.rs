use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::config::CharMapLocation;
use crate::error::ViewerResult;
use crate::surface::{PixelSurface, TextSurface};

/// Where the document bytes come from. Exactly one locator is expected per
/// viewer.
#[derive(Debug, Clone)]
pub enum DocumentLocator {
    Path(PathBuf),
    Bytes(Arc<Vec<u8>>),
}

impl DocumentLocator {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn bytes(bytes: Vec<u8>) -> Self {
        Self::Bytes(Arc::new(bytes))
    }
}

/// Options forwarded verbatim to the document source at open time.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub char_map: Option<CharMapLocation>,
}

/// External provider of page count and per-page decode/render capability.
pub trait DocumentSource: Send + Sync {
    fn open(
        &self,
        locator: DocumentLocator,
        options: OpenOptions,
    ) -> BoxFuture<'static, ViewerResult<Arc<dyn DocumentHandle>>>;
}

/// One open document. `cleanup` releases transient per-page state while the
/// document stays usable; `destroy` releases the document itself.
pub trait DocumentHandle: Send + Sync {
    fn page_count(&self) -> usize;
    /// Fetches the handle for a 1-based page number.
    fn page(&self, number: usize) -> BoxFuture<'_, ViewerResult<Arc<dyn PageHandle>>>;
    fn cleanup(&self);
    fn destroy(&self);
}

/// Opaque per-page object exposing intrinsic size and render operations.
/// Shared only between the viewer and the one page that owns it.
pub trait PageHandle: Send + Sync {
    /// Intrinsic (unscaled) page size in document units.
    fn intrinsic_size(&self) -> (f32, f32);
    /// Renders the page's pixels at `scale` into the target surface.
    fn render_pixels<'a>(
        &'a self,
        target: &'a mut dyn PixelSurface,
        scale: f32,
    ) -> BoxFuture<'a, ViewerResult<()>>;
    /// Places the page's text runs, scaled by `scale`, into the target
    /// surface.
    fn render_text<'a>(
        &'a self,
        target: &'a mut dyn TextSurface,
        scale: f32,
    ) -> BoxFuture<'a, ViewerResult<()>>;
    /// Releases decode state held for this page.
    fn cleanup(&self);
}
