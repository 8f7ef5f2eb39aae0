mod highlight;

use std::sync::Arc;

use crate::config::SCROLLBAR_MARGIN;
use crate::ids::HighlightId;
use crate::page::highlight::{HighlightRect, HighlightSet};
use crate::source::PageHandle;
use crate::surface::{OverlayRect, PageSlot, PixelSurface, TextSurface};

/// What a render call decided under the viewer lock. The async half of the
/// render runs against this plan and applies its result through
/// [`Page::finish_render`], which rejects it if the generation moved on.
pub(crate) enum RenderPlan {
    /// The page is unbound; only layout space was reserved.
    Reserved,
    Render {
        generation: u64,
        handle: Arc<dyn PageHandle>,
        scale: f32,
        pixel: Option<Box<dyn PixelSurface>>,
        text: Option<Box<dyn TextSurface>>,
    },
}

/// One page's render/evict/highlight state machine.
///
/// Created once per index at load time and destroyed only with the viewer;
/// the bound document-page handle and rendered layers have a shorter
/// bind → render → revoke → rebind sub-lifecycle driven by the windowing
/// policy.
pub(crate) struct Page {
    number: usize,
    width: f32,
    height: f32,
    gap: f32,
    render_text: bool,
    slot: Box<dyn PageSlot>,
    handle: Option<Arc<dyn PageHandle>>,
    pixel_layer: Option<Box<dyn PixelSurface>>,
    text_layer: Option<Box<dyn TextSurface>>,
    // Set while a created-but-unattached layer is out with a render task, so
    // overlapping passes do not plan the same layer twice.
    pixel_pending: bool,
    text_pending: bool,
    highlights: HighlightSet,
    generation: u64,
    destroyed: bool,
}

impl Page {
    pub(crate) fn new(
        number: usize,
        base_width: f32,
        placeholder_height: f32,
        gap: f32,
        render_text: bool,
        mut slot: Box<dyn PageSlot>,
    ) -> Self {
        slot.set_loading_visible(true);
        Self {
            number,
            width: base_width - SCROLLBAR_MARGIN,
            height: placeholder_height,
            gap,
            render_text,
            slot,
            handle: None,
            pixel_layer: None,
            text_layer: None,
            pixel_pending: false,
            text_pending: false,
            highlights: HighlightSet::default(),
            generation: 0,
            destroyed: false,
        }
    }

    pub(crate) fn number(&self) -> usize {
        self.number
    }

    pub(crate) fn height(&self) -> f32 {
        self.height
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn has_pixel_layer(&self) -> bool {
        self.pixel_layer.is_some()
    }

    pub(crate) fn highlight_count(&self) -> usize {
        self.highlights.len()
    }

    pub(crate) fn attached_highlight_count(&self) -> usize {
        self.highlights.attached_count()
    }

    fn intrinsic_size(&self) -> Option<(f32, f32)> {
        self.handle.as_ref().map(|handle| handle.intrinsic_size())
    }

    /// Rendered-pixels per intrinsic unit; 1.0 until a document page is
    /// bound.
    pub(crate) fn scale(&self) -> f32 {
        match self.intrinsic_size() {
            Some((width, _)) if width > 0.0 => self.width / width,
            _ => 1.0,
        }
    }

    pub(crate) fn bind(&mut self, handle: Arc<dyn PageHandle>) {
        self.handle = Some(handle);
    }

    /// Pure data mutation; the caller re-renders when it wants the new
    /// geometry on screen.
    pub(crate) fn resize(&mut self, base_width: f32) {
        self.width = base_width - SCROLLBAR_MARGIN;
        if let Some((_, intrinsic_height)) = self.intrinsic_size() {
            self.height = intrinsic_height * self.scale();
        }
    }

    /// Synchronous half of `render`: reserves layout, tears layers down on
    /// `force`, and creates the surfaces the async half should fill. Never
    /// fails; an unbound page only reserves space.
    pub(crate) fn begin_render(&mut self, force: bool) -> RenderPlan {
        if self.destroyed {
            return RenderPlan::Reserved;
        }

        self.slot.set_loading_visible(true);
        let Some(handle) = self.handle.clone() else {
            self.slot.set_layout(self.width, self.height, self.gap);
            return RenderPlan::Reserved;
        };

        let scale = self.scale();
        if let Some((_, intrinsic_height)) = self.intrinsic_size() {
            self.height = intrinsic_height * scale;
        }
        self.slot.set_layout(self.width, self.height, self.gap);

        if force {
            self.teardown_layers();
        }
        let generation = self.generation;

        let need_pixel = self.pixel_layer.is_none() && !self.pixel_pending;
        let pixel = need_pixel.then(|| {
            self.pixel_pending = true;
            self.slot.create_pixel_surface(self.width, self.height)
        });
        let need_text = self.render_text && self.text_layer.is_none() && !self.text_pending;
        let text = need_text.then(|| {
            self.text_pending = true;
            self.slot.create_text_surface(self.width, self.height)
        });

        RenderPlan::Render {
            generation,
            handle,
            scale,
            pixel,
            text,
        }
    }

    /// Applies a completed render. Returns false (dropping the layers) when
    /// the page was revoked, force-rerendered, or destroyed since the plan
    /// was made.
    pub(crate) fn finish_render(
        &mut self,
        generation: u64,
        pixel: Option<Box<dyn PixelSurface>>,
        text: Option<Box<dyn TextSurface>>,
    ) -> bool {
        if self.destroyed || generation != self.generation {
            return false;
        }

        if let Some(mut surface) = pixel {
            surface.attach();
            self.pixel_layer = Some(surface);
            self.pixel_pending = false;
        }
        if let Some(mut surface) = text {
            surface.attach();
            self.text_layer = Some(surface);
            self.text_pending = false;
        }

        if !self.pixel_pending && !self.text_pending {
            self.slot.set_loading_visible(false);
        }

        // Rebuild every overlay so highlights survive a forced rerender.
        self.highlights.detach_all();
        for id in self.highlights.ids() {
            self.attach_highlight(&id);
        }
        true
    }

    /// Releases a failed plan's pending flags so a later pass can rebuild;
    /// the loading placeholder stays up.
    pub(crate) fn abort_render(&mut self, generation: u64, had_pixel: bool, had_text: bool) {
        if self.destroyed || generation != self.generation {
            return;
        }
        if had_pixel {
            self.pixel_pending = false;
        }
        if had_text {
            self.text_pending = false;
        }
    }

    /// Registers a highlight in intrinsic coordinates and attaches its
    /// overlay at the current scale.
    pub(crate) fn highlight(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: &str,
        opacity: f32,
    ) -> HighlightId {
        let id = self.highlights.insert(
            HighlightRect {
                x,
                y,
                width,
                height,
            },
            color,
            opacity,
        );
        self.attach_highlight(&id);
        id
    }

    /// Idempotent: attaches the overlay for a known id if it is not already
    /// attached.
    pub(crate) fn attach_highlight(&mut self, id: &HighlightId) {
        let scale = self.scale();
        let Some(entry) = self.highlights.get_mut(id) else {
            return;
        };
        if entry.overlay.is_some() {
            return;
        }
        let rect = OverlayRect {
            x: entry.rect.x * scale,
            y: entry.rect.y * scale,
            width: entry.rect.width * scale,
            height: entry.rect.height * scale,
        };
        entry.overlay = Some(
            self.slot
                .create_highlight_overlay(rect, &entry.color, entry.opacity),
        );
    }

    pub(crate) fn remove_highlight(&mut self, id: &HighlightId, delete_source: bool) {
        self.highlights.remove(id, delete_source);
    }

    pub(crate) fn remove_all_highlights(&mut self, delete_source: bool) {
        self.highlights.remove_all(delete_source);
    }

    /// Eviction primitive: discards layers and the bound document page,
    /// restores the loading placeholder, and detaches (but keeps) highlight
    /// definitions. After this the page behaves as freshly created except
    /// geometry and highlight sources persist.
    pub(crate) fn revoke(&mut self) {
        self.teardown_layers();
        if let Some(handle) = self.handle.take() {
            handle.cleanup();
        }
        self.slot.set_loading_visible(true);
        self.highlights.detach_all();
    }

    /// Terminal: revoke, drop the page element, forget highlights.
    pub(crate) fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.revoke();
        self.slot.remove();
        self.highlights.clear();
        self.destroyed = true;
    }

    fn teardown_layers(&mut self) {
        if let Some(mut surface) = self.pixel_layer.take() {
            surface.detach();
        }
        if let Some(mut surface) = self.text_layer.take() {
            surface.detach();
        }
        self.pixel_pending = false;
        self.text_pending = false;
        // Invalidates any in-flight fetch or render aimed at this page.
        self.generation += 1;
    }
}
