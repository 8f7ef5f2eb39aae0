use std::sync::Arc;

/// One decoded page's pixels, RGBA8, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
}

impl PixelFrame {
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// A positioned text run in page coordinates (already scaled by the source
/// when handed to a [`TextSurface`]).
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

impl TextRun {
    pub fn scaled(&self, scale: f32) -> TextRun {
        TextRun {
            text: self.text.clone(),
            x: self.x * scale,
            y: self.y * scale,
        }
    }
}

/// Overlay geometry in rendered pixels, relative to the page's top-left
/// corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Container styling applied once at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportChrome {
    pub side_padding: f32,
    pub background_color: String,
    pub border_style: String,
}

/// The scrollable container the viewer is bound to.
///
/// The host owns the real widget; the viewer only reads geometry, writes the
/// scroll offset, and creates one [`PageSlot`] per page. The host must report
/// scroll and size changes back through `Viewer::notify_scroll` /
/// `Viewer::notify_resize` — the viewer never polls.
pub trait Viewport: Send {
    fn client_width(&self) -> f32;
    fn client_height(&self) -> f32;
    fn scroll_offset(&self) -> f32;
    fn set_scroll_offset(&mut self, offset: f32);
    fn apply_chrome(&mut self, chrome: &ViewportChrome);
    /// Appends a new page element for the given 1-based page number and
    /// returns the capability handle for it.
    fn create_page_slot(&mut self, page_number: usize) -> Box<dyn PageSlot>;
}

/// One page's root element: layout box, loading placeholder, and factory for
/// the layers that live inside it.
pub trait PageSlot: Send {
    fn set_layout(&mut self, width: f32, height: f32, bottom_margin: f32);
    fn set_loading_visible(&mut self, visible: bool);
    /// Creates a detached pixel surface sized in rendered pixels; the caller
    /// attaches it once rendering succeeded.
    fn create_pixel_surface(&mut self, width: f32, height: f32) -> Box<dyn PixelSurface>;
    /// Creates a detached text surface sized in rendered pixels.
    fn create_text_surface(&mut self, width: f32, height: f32) -> Box<dyn TextSurface>;
    /// Creates an overlay already attached at the given rect.
    fn create_highlight_overlay(
        &mut self,
        rect: OverlayRect,
        color: &str,
        opacity: f32,
    ) -> Box<dyn HighlightOverlay>;
    /// Removes the page element from the container. Terminal.
    fn remove(&mut self);
}

/// Canvas-like bitmap target for one page.
pub trait PixelSurface: Send {
    fn put_frame(&mut self, frame: PixelFrame);
    fn attach(&mut self);
    fn detach(&mut self);
}

/// DOM-like container receiving positioned text runs for one page.
pub trait TextSurface: Send {
    fn place_run(&mut self, run: &TextRun);
    fn attach(&mut self);
    fn detach(&mut self);
}

/// A single highlight rectangle element.
pub trait HighlightOverlay: Send {
    fn detach(&mut self);
}
