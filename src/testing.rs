//! Mock surfaces and document source shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::error::{ViewerError, ViewerResult};
use crate::source::{DocumentHandle, DocumentLocator, DocumentSource, OpenOptions, PageHandle};
use crate::surface::{
    HighlightOverlay, OverlayRect, PageSlot, PixelFrame, PixelSurface, TextRun, TextSurface,
    Viewport, ViewportChrome,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Slot and layer mocks

pub(crate) struct OverlayRecord {
    pub(crate) rect: OverlayRect,
    pub(crate) color: String,
    pub(crate) opacity: f32,
    pub(crate) attached: AtomicBool,
}

#[derive(Default)]
pub(crate) struct SlotProbe {
    layout: Mutex<Option<(f32, f32, f32)>>,
    pub(crate) loading_visible: AtomicBool,
    pub(crate) removed: AtomicBool,
    pub(crate) pixel_surfaces_created: AtomicUsize,
    pub(crate) text_surfaces_created: AtomicUsize,
    pub(crate) pixel_attaches: AtomicUsize,
    pub(crate) pixel_detaches: AtomicUsize,
    pub(crate) text_attaches: AtomicUsize,
    pub(crate) text_detaches: AtomicUsize,
    pub(crate) frames_put: AtomicUsize,
    pub(crate) runs_placed: AtomicUsize,
    pub(crate) overlays_created: AtomicUsize,
    overlays: Mutex<Vec<Arc<OverlayRecord>>>,
}

impl SlotProbe {
    pub(crate) fn layout(&self) -> Option<(f32, f32, f32)> {
        *lock(&self.layout)
    }

    pub(crate) fn attached_overlay_count(&self) -> usize {
        lock(&self.overlays)
            .iter()
            .filter(|record| record.attached.load(Ordering::SeqCst))
            .count()
    }

    pub(crate) fn last_overlay(&self) -> Option<OverlayRect> {
        lock(&self.overlays).last().map(|record| record.rect)
    }

    pub(crate) fn last_overlay_style(&self) -> Option<(String, f32)> {
        lock(&self.overlays)
            .last()
            .map(|record| (record.color.clone(), record.opacity))
    }

    pub(crate) fn pixel_layer_live(&self) -> bool {
        self.pixel_attaches.load(Ordering::SeqCst) > self.pixel_detaches.load(Ordering::SeqCst)
    }
}

pub(crate) struct MockSlot {
    probe: Arc<SlotProbe>,
}

impl MockSlot {
    pub(crate) fn new(probe: Arc<SlotProbe>) -> Self {
        Self { probe }
    }
}

impl PageSlot for MockSlot {
    fn set_layout(&mut self, width: f32, height: f32, bottom_margin: f32) {
        *lock(&self.probe.layout) = Some((width, height, bottom_margin));
    }

    fn set_loading_visible(&mut self, visible: bool) {
        self.probe.loading_visible.store(visible, Ordering::SeqCst);
    }

    fn create_pixel_surface(&mut self, _width: f32, _height: f32) -> Box<dyn PixelSurface> {
        self.probe
            .pixel_surfaces_created
            .fetch_add(1, Ordering::SeqCst);
        Box::new(MockPixelSurface {
            probe: Arc::clone(&self.probe),
        })
    }

    fn create_text_surface(&mut self, _width: f32, _height: f32) -> Box<dyn TextSurface> {
        self.probe
            .text_surfaces_created
            .fetch_add(1, Ordering::SeqCst);
        Box::new(MockTextSurface {
            probe: Arc::clone(&self.probe),
        })
    }

    fn create_highlight_overlay(
        &mut self,
        rect: OverlayRect,
        color: &str,
        opacity: f32,
    ) -> Box<dyn HighlightOverlay> {
        self.probe.overlays_created.fetch_add(1, Ordering::SeqCst);
        let record = Arc::new(OverlayRecord {
            rect,
            color: color.to_string(),
            opacity,
            attached: AtomicBool::new(true),
        });
        lock(&self.probe.overlays).push(Arc::clone(&record));
        Box::new(MockOverlay { record })
    }

    fn remove(&mut self) {
        self.probe.removed.store(true, Ordering::SeqCst);
    }
}

struct MockPixelSurface {
    probe: Arc<SlotProbe>,
}

impl PixelSurface for MockPixelSurface {
    fn put_frame(&mut self, _frame: PixelFrame) {
        self.probe.frames_put.fetch_add(1, Ordering::SeqCst);
    }

    fn attach(&mut self) {
        self.probe.pixel_attaches.fetch_add(1, Ordering::SeqCst);
    }

    fn detach(&mut self) {
        self.probe.pixel_detaches.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockTextSurface {
    probe: Arc<SlotProbe>,
}

impl TextSurface for MockTextSurface {
    fn place_run(&mut self, _run: &TextRun) {
        self.probe.runs_placed.fetch_add(1, Ordering::SeqCst);
    }

    fn attach(&mut self) {
        self.probe.text_attaches.fetch_add(1, Ordering::SeqCst);
    }

    fn detach(&mut self) {
        self.probe.text_detaches.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockOverlay {
    record: Arc<OverlayRecord>,
}

impl HighlightOverlay for MockOverlay {
    fn detach(&mut self) {
        self.record.attached.store(false, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Viewport mock

#[derive(Default)]
pub(crate) struct ViewportProbe {
    pub(crate) width: Mutex<f32>,
    pub(crate) height: Mutex<f32>,
    scroll: Mutex<f32>,
    pub(crate) scroll_reads: AtomicUsize,
    pub(crate) scroll_sets: Mutex<Vec<f32>>,
    pub(crate) chrome: Mutex<Option<ViewportChrome>>,
    slots: Mutex<Vec<Arc<SlotProbe>>>,
}

impl ViewportProbe {
    pub(crate) fn sized(width: f32, height: f32) -> Arc<Self> {
        let probe = Self::default();
        *lock(&probe.width) = width;
        *lock(&probe.height) = height;
        Arc::new(probe)
    }

    pub(crate) fn set_scroll(&self, offset: f32) {
        *lock(&self.scroll) = offset;
    }

    pub(crate) fn scroll(&self) -> f32 {
        *lock(&self.scroll)
    }

    pub(crate) fn set_width(&self, width: f32) {
        *lock(&self.width) = width;
    }

    pub(crate) fn slot(&self, index: usize) -> Arc<SlotProbe> {
        Arc::clone(&lock(&self.slots)[index])
    }

    pub(crate) fn slot_count(&self) -> usize {
        lock(&self.slots).len()
    }

    pub(crate) fn live_pixel_layer_count(&self) -> usize {
        lock(&self.slots)
            .iter()
            .filter(|slot| slot.pixel_layer_live())
            .count()
    }
}

pub(crate) struct MockViewport {
    probe: Arc<ViewportProbe>,
}

impl MockViewport {
    pub(crate) fn new(probe: Arc<ViewportProbe>) -> Self {
        Self { probe }
    }
}

impl Viewport for MockViewport {
    fn client_width(&self) -> f32 {
        *lock(&self.probe.width)
    }

    fn client_height(&self) -> f32 {
        *lock(&self.probe.height)
    }

    fn scroll_offset(&self) -> f32 {
        self.probe.scroll_reads.fetch_add(1, Ordering::SeqCst);
        *lock(&self.probe.scroll)
    }

    fn set_scroll_offset(&mut self, offset: f32) {
        *lock(&self.probe.scroll) = offset;
        lock(&self.probe.scroll_sets).push(offset);
    }

    fn apply_chrome(&mut self, chrome: &ViewportChrome) {
        *lock(&self.probe.chrome) = Some(chrome.clone());
    }

    fn create_page_slot(&mut self, _page_number: usize) -> Box<dyn PageSlot> {
        let probe = Arc::new(SlotProbe::default());
        lock(&self.probe.slots).push(Arc::clone(&probe));
        Box::new(MockSlot::new(probe))
    }
}

// ---------------------------------------------------------------------------
// Document source mock

#[derive(Default)]
pub(crate) struct PageProbe {
    pub(crate) pixel_renders: AtomicUsize,
    pub(crate) text_renders: AtomicUsize,
    pub(crate) cleanups: AtomicUsize,
}

pub(crate) struct MockPageHandle {
    size: (f32, f32),
    fail_pixels: bool,
    probe: Arc<PageProbe>,
}

impl MockPageHandle {
    pub(crate) fn sized(size: (f32, f32), probe: Arc<PageProbe>) -> Self {
        Self {
            size,
            fail_pixels: false,
            probe,
        }
    }
}

impl PageHandle for MockPageHandle {
    fn intrinsic_size(&self) -> (f32, f32) {
        self.size
    }

    fn render_pixels<'a>(
        &'a self,
        target: &'a mut dyn PixelSurface,
        _scale: f32,
    ) -> BoxFuture<'a, ViewerResult<()>> {
        Box::pin(async move {
            if self.fail_pixels {
                return Err(ViewerError::invalid_argument("mock pixel render failure"));
            }
            self.probe.pixel_renders.fetch_add(1, Ordering::SeqCst);
            target.put_frame(PixelFrame {
                width: 1,
                height: 1,
                pixels: vec![0xff; 4].into(),
            });
            Ok(())
        })
    }

    fn render_text<'a>(
        &'a self,
        target: &'a mut dyn TextSurface,
        scale: f32,
    ) -> BoxFuture<'a, ViewerResult<()>> {
        Box::pin(async move {
            self.probe.text_renders.fetch_add(1, Ordering::SeqCst);
            target.place_run(
                &TextRun {
                    text: "mock".to_string(),
                    x: 1.0,
                    y: 2.0,
                }
                .scaled(scale),
            );
            Ok(())
        })
    }

    fn cleanup(&self) {
        self.probe.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub(crate) struct MockSourceConfig {
    pub(crate) page_count: usize,
    pub(crate) page_size: (f32, f32),
    pub(crate) fail_open: bool,
    pub(crate) fail_fetch: HashSet<usize>,
    pub(crate) fail_pixels: HashSet<usize>,
    pub(crate) fetch_delay: Duration,
}

impl Default for MockSourceConfig {
    fn default() -> Self {
        Self {
            page_count: 3,
            page_size: (600.0, 800.0),
            fail_open: false,
            fail_fetch: HashSet::new(),
            fail_pixels: HashSet::new(),
            fetch_delay: Duration::ZERO,
        }
    }
}

#[derive(Default)]
pub(crate) struct SourceProbe {
    fetches: Mutex<Vec<usize>>,
    page_probes: Mutex<HashMap<usize, Arc<PageProbe>>>,
    pub(crate) doc_cleanups: AtomicUsize,
    pub(crate) doc_destroys: AtomicUsize,
}

impl SourceProbe {
    pub(crate) fn fetches(&self) -> Vec<usize> {
        lock(&self.fetches).clone()
    }

    pub(crate) fn page_probe(&self, number: usize) -> Option<Arc<PageProbe>> {
        lock(&self.page_probes).get(&number).cloned()
    }
}

pub(crate) struct MockSource {
    config: MockSourceConfig,
    probe: Arc<SourceProbe>,
}

impl MockSource {
    pub(crate) fn new(config: MockSourceConfig) -> (Self, Arc<SourceProbe>) {
        let probe = Arc::new(SourceProbe::default());
        (
            Self {
                config,
                probe: Arc::clone(&probe),
            },
            probe,
        )
    }
}

impl DocumentSource for MockSource {
    fn open(
        &self,
        _locator: DocumentLocator,
        _options: OpenOptions,
    ) -> BoxFuture<'static, ViewerResult<Arc<dyn DocumentHandle>>> {
        let config = self.config.clone();
        let probe = Arc::clone(&self.probe);
        Box::pin(async move {
            if config.fail_open {
                return Err(ViewerError::document_open("mock open failure"));
            }
            Ok(Arc::new(MockDocument { config, probe }) as Arc<dyn DocumentHandle>)
        })
    }
}

struct MockDocument {
    config: MockSourceConfig,
    probe: Arc<SourceProbe>,
}

impl DocumentHandle for MockDocument {
    fn page_count(&self) -> usize {
        self.config.page_count
    }

    fn page(&self, number: usize) -> BoxFuture<'_, ViewerResult<Arc<dyn PageHandle>>> {
        Box::pin(async move {
            lock(&self.probe.fetches).push(number);
            if !self.config.fetch_delay.is_zero() {
                tokio::time::sleep(self.config.fetch_delay).await;
            }
            if self.config.fail_fetch.contains(&number) {
                return Err(ViewerError::page_fetch(
                    number,
                    ViewerError::invalid_argument("mock fetch failure"),
                ));
            }

            let probe = Arc::clone(
                lock(&self.probe.page_probes)
                    .entry(number)
                    .or_insert_with(|| Arc::new(PageProbe::default())),
            );
            Ok(Arc::new(MockPageHandle {
                size: self.config.page_size,
                fail_pixels: self.config.fail_pixels.contains(&number),
                probe,
            }) as Arc<dyn PageHandle>)
        })
    }

    fn cleanup(&self) {
        self.probe.doc_cleanups.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy(&self) {
        self.probe.doc_destroys.fetch_add(1, Ordering::SeqCst);
    }
}
