mod debounce;
mod layout;

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::{DEFAULT_HIGHLIGHT_OPACITY, ViewerOptions};
use crate::error::{ViewerError, ViewerResult};
use crate::event::{EventRegistry, ListenerId, ViewerEvent};
use crate::ids::HighlightId;
use crate::page::{Page, RenderPlan};
use crate::source::{DocumentHandle, DocumentLocator, DocumentSource, HayroSource, OpenOptions};
use crate::surface::{Viewport, ViewportChrome};
use crate::viewer::debounce::Debounce;

/// Builds a [`Viewer`]. The viewport capability and a document locator are
/// required; the document source defaults to the shipped hayro source.
#[derive(Default)]
pub struct ViewerBuilder {
    viewport: Option<Box<dyn Viewport>>,
    source: Option<Arc<dyn DocumentSource>>,
    locator: Option<DocumentLocator>,
    options: ViewerOptions,
}

impl ViewerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn viewport(mut self, viewport: Box<dyn Viewport>) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn source(mut self, source: Arc<dyn DocumentSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn locator(mut self, locator: DocumentLocator) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn path(self, path: impl Into<PathBuf>) -> Self {
        self.locator(DocumentLocator::path(path))
    }

    pub fn bytes(self, bytes: Vec<u8>) -> Self {
        self.locator(DocumentLocator::bytes(bytes))
    }

    pub fn options(mut self, options: ViewerOptions) -> Self {
        self.options = options;
        self
    }

    /// Validates the configuration and starts opening the document. Must be
    /// called within a tokio runtime. Configuration errors surface here,
    /// synchronously; the document open itself completes asynchronously and
    /// flips the viewer to ready.
    pub fn open(self) -> ViewerResult<Viewer> {
        let viewport = self
            .viewport
            .ok_or_else(|| ViewerError::config("a viewport capability is required"))?;
        let locator = self
            .locator
            .ok_or_else(|| ViewerError::config("a document locator (path or bytes) is required"))?;
        let source = self
            .source
            .unwrap_or_else(|| Arc::new(HayroSource) as Arc<dyn DocumentSource>);
        Viewer::open(viewport, source, locator, self.options)
    }
}

/// The page-window manager: owns the ordered page sequence, re-evaluates
/// which pages hold live rendered content as the host reports scroll and
/// resize, tracks the current page, and exposes the `load`/`pagechanged`
/// event surface.
pub struct Viewer {
    shared: Arc<Mutex<ViewerShared>>,
    events: Arc<EventRegistry>,
    scroll_debounce: Debounce,
    resize_debounce: Debounce,
    open_task: Option<JoinHandle<()>>,
}

struct ViewerShared {
    viewport: Box<dyn Viewport>,
    document: Option<Arc<dyn DocumentHandle>>,
    pages: Vec<Page>,
    /// Page width basis: container width minus both side paddings.
    width: f32,
    placeholder_height: f32,
    page_gap: f32,
    side_padding: f32,
    window_span: usize,
    render_text: bool,
    ready: bool,
    destroyed: bool,
    current_page: usize,
    open_error: Option<String>,
}

impl Viewer {
    fn open(
        mut viewport: Box<dyn Viewport>,
        source: Arc<dyn DocumentSource>,
        locator: DocumentLocator,
        options: ViewerOptions,
    ) -> ViewerResult<Self> {
        let options = options.sanitized();
        viewport.apply_chrome(&ViewportChrome {
            side_padding: options.side_padding,
            background_color: options.background_color.clone(),
            border_style: options.border_style.clone(),
        });

        let width = viewport.client_width() - 2.0 * options.side_padding;
        let measured_height = viewport.client_height();
        let placeholder_height = if measured_height > 0.0 {
            measured_height
        } else {
            options.placeholder_height
        };

        let shared = Arc::new(Mutex::new(ViewerShared {
            viewport,
            document: None,
            pages: Vec::new(),
            width,
            placeholder_height,
            page_gap: options.page_gap,
            side_padding: options.side_padding,
            window_span: options.window_span,
            render_text: options.render_text,
            ready: false,
            destroyed: false,
            current_page: 0,
            open_error: None,
        }));
        let events = Arc::new(EventRegistry::default());
        let debounce = Duration::from_millis(options.debounce_ms);

        let open_task = tokio::spawn(open_document(
            Arc::clone(&shared),
            Arc::clone(&events),
            source,
            locator,
            OpenOptions {
                char_map: options.char_map.clone(),
            },
        ));

        Ok(Self {
            shared,
            events,
            scroll_debounce: Debounce::new(debounce),
            resize_debounce: Debounce::new(debounce),
            open_task: Some(open_task),
        })
    }

    pub fn is_ready(&self) -> bool {
        lock_shared(&self.shared).ready
    }

    /// 1-based index of the page whose span contains the viewport's top
    /// edge as of the last windowing pass; 0 when none does.
    pub fn current_page(&self) -> usize {
        lock_shared(&self.shared).current_page
    }

    pub fn page_count(&self) -> usize {
        lock_shared(&self.shared).pages.len()
    }

    /// The retained document-open failure, if opening failed. A viewer with
    /// an open error never becomes ready.
    pub fn open_error(&self) -> Option<String> {
        lock_shared(&self.shared).open_error.clone()
    }

    /// Number of pages currently holding a live pixel layer. Bounded by the
    /// inclusion window regardless of document length.
    pub fn live_pixel_layers(&self) -> usize {
        lock_shared(&self.shared)
            .pages
            .iter()
            .filter(|page| page.has_pixel_layer())
            .count()
    }

    /// Runs a windowing pass immediately, bypassing the debounce.
    pub async fn render(&self, force: bool) {
        run_windowing_pass(&self.shared, &self.events, force).await;
    }

    /// Host notification that the container scrolled. Bursts are coalesced
    /// into one windowing pass after the trailing debounce.
    pub fn notify_scroll(&mut self) {
        if !self.is_ready() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let events = Arc::clone(&self.events);
        self.scroll_debounce.schedule(async move {
            run_windowing_pass(&shared, &events, false).await;
        });
    }

    /// Host notification that the container geometry changed. After the
    /// debounce every page is resized to the new width basis and a forced
    /// windowing pass rebuilds the visible layers.
    pub fn notify_resize(&mut self) {
        let shared = Arc::clone(&self.shared);
        let events = Arc::clone(&self.events);
        self.resize_debounce.schedule(async move {
            let resized = {
                let mut state = lock_shared(&shared);
                if !state.ready || state.destroyed {
                    false
                } else {
                    let width = state.viewport.client_width() - 2.0 * state.side_padding;
                    if width > 0.0 {
                        state.width = width;
                        for page in state.pages.iter_mut() {
                            page.resize(width);
                        }
                        true
                    } else {
                        false
                    }
                }
            };
            if resized {
                run_windowing_pass(&shared, &events, true).await;
            }
        });
    }

    /// Scrolls so that `offset` within the given page aligns with the
    /// container's top edge. With `use_original_metrics` the offset is in
    /// the page's intrinsic coordinate space and is scaled by the page's
    /// current scale — an unbound page is fetched and rendered first so the
    /// scale is accurate. Out-of-range page numbers are a silent no-op.
    pub async fn scroll_to(
        &self,
        page_number: usize,
        offset: f32,
        use_original_metrics: bool,
    ) -> ViewerResult<()> {
        {
            let state = lock_shared(&self.shared);
            if !state.ready
                || state.destroyed
                || page_number < 1
                || page_number > state.pages.len()
            {
                return Ok(());
            }
        }
        let index = page_number - 1;

        if !use_original_metrics {
            let mut state = lock_shared(&self.shared);
            let top = layout::page_top(
                state.pages[..index].iter().map(|page| page.height()),
                state.page_gap,
            );
            state.viewport.set_scroll_offset(top + offset);
            return Ok(());
        }

        let fetch = {
            let state = lock_shared(&self.shared);
            let page = &state.pages[index];
            (!page.is_bound()).then(|| (state.document.clone(), page.generation()))
        };
        if let Some((document, generation)) = fetch {
            let Some(document) = document else {
                return Ok(());
            };
            let handle = document.page(page_number).await?;
            {
                let mut state = lock_shared(&self.shared);
                if state.destroyed {
                    handle.cleanup();
                    return Ok(());
                }
                let page = &mut state.pages[index];
                if page.generation() == generation && !page.is_bound() {
                    page.bind(handle);
                } else {
                    handle.cleanup();
                }
            }
            render_page(&self.shared, index, true).await;
        }

        let mut state = lock_shared(&self.shared);
        if state.destroyed {
            return Ok(());
        }
        let top = layout::page_top(
            state.pages[..index].iter().map(|page| page.height()),
            state.page_gap,
        );
        let scaled = offset * state.pages[index].scale();
        state.viewport.set_scroll_offset(top + scaled);
        Ok(())
    }

    /// Registers a highlight on a page, in intrinsic coordinates. Returns
    /// the empty id when the viewer is not ready or the page number is out
    /// of range.
    pub fn highlight(
        &self,
        page_number: usize,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: &str,
    ) -> HighlightId {
        let mut state = lock_shared(&self.shared);
        if !state.ready || state.destroyed || page_number < 1 || page_number > state.pages.len() {
            return HighlightId::none();
        }
        state.pages[page_number - 1].highlight(
            x,
            y,
            width,
            height,
            color,
            DEFAULT_HIGHLIGHT_OPACITY,
        )
    }

    /// Removes a highlight by id, forgetting its definition. Out-of-range
    /// page numbers and unknown ids are silent no-ops.
    pub fn remove_highlight(&self, page_number: usize, id: &HighlightId) {
        let mut state = lock_shared(&self.shared);
        if !state.ready || state.destroyed || page_number < 1 || page_number > state.pages.len() {
            return;
        }
        state.pages[page_number - 1].remove_highlight(id, true);
    }

    pub fn remove_all_highlights(&self) {
        let mut state = lock_shared(&self.shared);
        if state.destroyed {
            return;
        }
        for page in state.pages.iter_mut() {
            page.remove_all_highlights(true);
        }
    }

    /// Registers a handler for `load` or `pagechanged`. Unknown event names
    /// are a no-op returning the null id.
    pub fn add_event_listener<F>(&self, name: &str, handler: F) -> ListenerId
    where
        F: FnMut(&ViewerEvent) + Send + 'static,
    {
        self.events.add(name, Box::new(handler))
    }

    /// Unregisters a handler. Unknown event names or ids leave the viewer
    /// unchanged.
    pub fn remove_event_listener(&mut self, name: &str, listener: ListenerId) -> &mut Self {
        self.events.remove(name, listener);
        self
    }

    /// Tears the viewer down: cancels pending debounces and the open task,
    /// destroys every page, and releases the document (cleanup, then
    /// destroy). Consumes the viewer, so a second destroy cannot happen.
    pub fn destroy(mut self) {
        self.scroll_debounce.cancel();
        self.resize_debounce.cancel();
        if let Some(task) = self.open_task.take() {
            task.abort();
        }

        let mut state = lock_shared(&self.shared);
        state.destroyed = true;
        state.ready = false;
        state.current_page = 0;
        for page in state.pages.iter_mut() {
            page.destroy();
        }
        state.pages.clear();
        if let Some(document) = state.document.take() {
            document.cleanup();
            document.destroy();
        }
        drop(state);

        self.events.clear();
    }
}

fn lock_shared(shared: &Arc<Mutex<ViewerShared>>) -> MutexGuard<'_, ViewerShared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn open_document(
    shared: Arc<Mutex<ViewerShared>>,
    events: Arc<EventRegistry>,
    source: Arc<dyn DocumentSource>,
    locator: DocumentLocator,
    open_options: OpenOptions,
) {
    match source.open(locator, open_options).await {
        Err(err) => {
            log::warn!("document open failed: {err}");
            // The viewer stays not-ready; the failure is retained for the
            // host to query.
            lock_shared(&shared).open_error = Some(err.to_string());
        }
        Ok(document) => {
            {
                let mut state = lock_shared(&shared);
                if state.destroyed {
                    document.cleanup();
                    document.destroy();
                    return;
                }
                let page_count = document.page_count();
                state.document = Some(document);
                for number in 1..=page_count {
                    let slot = state.viewport.create_page_slot(number);
                    let page = Page::new(
                        number,
                        state.width,
                        state.placeholder_height,
                        state.page_gap,
                        state.render_text,
                        slot,
                    );
                    state.pages.push(page);
                }
                state.ready = true;
            }
            run_windowing_pass(&shared, &events, true).await;
            events.emit_load();
        }
    }
}

/// One evaluation of every page's in/out-of-window status. Synchronous over
/// the page sequence; fetch/render work is spawned per in-window page and
/// checked against the page generation when it lands.
async fn run_windowing_pass(
    shared: &Arc<Mutex<ViewerShared>>,
    events: &Arc<EventRegistry>,
    force: bool,
) {
    let (to_render, changed) = {
        let mut state = lock_shared(shared);
        if !state.ready || state.destroyed || state.pages.is_empty() {
            return;
        }
        let container_height = state.viewport.client_height();
        let scroll_offset = state.viewport.scroll_offset();
        let window_span = state.window_span;
        let page_gap = state.page_gap;

        let mut cumulative_top = 0.0;
        let mut current_page = 0;
        let mut to_render = Vec::new();
        for (index, page) in state.pages.iter_mut().enumerate() {
            let page_height = page.height();
            let relative_top = scroll_offset - cumulative_top;
            let window =
                layout::inclusion_window(container_height, window_span, page_height, page_gap);
            if layout::is_in_window(relative_top, window) {
                to_render.push(index);
                if current_page == 0 && layout::holds_viewport_top(relative_top, page_height) {
                    current_page = index + 1;
                }
            } else {
                page.revoke();
            }
            cumulative_top += page_height + page_gap;
        }

        let changed = if state.current_page != current_page {
            state.current_page = current_page;
            Some(current_page)
        } else {
            None
        };
        (to_render, changed)
    };

    if let Some(current_page) = changed {
        events.emit_page_changed(current_page);
    }
    for index in to_render {
        tokio::spawn(materialize_page(Arc::clone(shared), index, force));
    }
}

/// Brings one in-window page up to date: fetches and binds its document
/// page if needed, then renders. Failures are isolated to this page; the
/// loading placeholder stays up.
async fn materialize_page(shared: Arc<Mutex<ViewerShared>>, index: usize, force: bool) {
    let fetch = {
        let state = lock_shared(&shared);
        if state.destroyed {
            return;
        }
        let Some(page) = state.pages.get(index) else {
            return;
        };
        (!page.is_bound()).then(|| (state.document.clone(), page.number(), page.generation()))
    };

    if let Some((document, number, generation)) = fetch {
        let Some(document) = document else {
            return;
        };
        match document.page(number).await {
            Err(err) => {
                log::warn!("page {number} fetch failed: {err}");
                return;
            }
            Ok(handle) => {
                let mut state = lock_shared(&shared);
                if state.destroyed {
                    handle.cleanup();
                    return;
                }
                let Some(page) = state.pages.get_mut(index) else {
                    return;
                };
                if page.generation() != generation || page.is_bound() {
                    // Revoked or re-rendered while the fetch was in flight.
                    log::debug!("discarding stale fetch result for page {number}");
                    handle.cleanup();
                    return;
                }
                page.bind(handle);
            }
        }
    }

    render_page(&shared, index, force).await;
}

/// Executes one page's render plan: the synchronous half reserves layout and
/// creates surfaces under the lock, the pixel and text tasks run
/// concurrently outside it, and the result is applied only if the page's
/// generation has not moved on.
async fn render_page(shared: &Arc<Mutex<ViewerShared>>, index: usize, force: bool) {
    let plan = {
        let mut state = lock_shared(shared);
        if state.destroyed {
            return;
        }
        let Some(page) = state.pages.get_mut(index) else {
            return;
        };
        page.begin_render(force)
    };

    let RenderPlan::Render {
        generation,
        handle,
        scale,
        mut pixel,
        mut text,
    } = plan
    else {
        return;
    };
    let had_pixel = pixel.is_some();
    let had_text = text.is_some();

    let pixel_task = async {
        match pixel.as_mut() {
            Some(surface) => handle.render_pixels(&mut **surface, scale).await,
            None => Ok(()),
        }
    };
    let text_task = async {
        match text.as_mut() {
            Some(surface) => handle.render_text(&mut **surface, scale).await,
            None => Ok(()),
        }
    };
    let (pixel_result, text_result) = futures_util::join!(pixel_task, text_task);

    let mut state = lock_shared(shared);
    let Some(page) = state.pages.get_mut(index) else {
        return;
    };
    if let Err(err) = pixel_result.and(text_result) {
        log::warn!("page {} render failed: {err}", page.number());
        page.abort_render(generation, had_pixel, had_text);
        return;
    }
    if !page.finish_render(generation, pixel, text) {
        log::debug!("discarding stale render result for page {}", page.number());
    }
}
