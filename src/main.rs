use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;
use simplelog::{ColorChoice, TermLogger, TerminalMode};

use docwin::error::{ViewerError, ViewerResult};
use docwin::surface::{
    HighlightOverlay, OverlayRect, PageSlot, PixelFrame, PixelSurface, TextRun, TextSurface,
    Viewport, ViewportChrome,
};
use docwin::{Viewer, ViewerBuilder, ViewerEvent, ViewerOptions};

/// Headless driver: opens a document, simulates a scroll session through it,
/// and reports page transitions and layer churn.
#[derive(Debug, Parser)]
#[command(name = "docwin", version, about)]
struct Cli {
    /// Document to open.
    path: PathBuf,
    /// Simulated viewport width in pixels.
    #[arg(long, default_value_t = 820.0)]
    width: f32,
    /// Simulated viewport height in pixels.
    #[arg(long, default_value_t = 500.0)]
    height: f32,
    /// Scroll distance per simulated tick.
    #[arg(long, default_value_t = 400.0)]
    step: f32,
    /// Skip the text layer.
    #[arg(long)]
    no_text: bool,
    /// Viewer options file (toml).
    #[arg(long)]
    options: Option<PathBuf>,
    /// Verbose layer-churn logging.
    #[arg(long)]
    verbose: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    if let Err(err) = run(Cli::parse()).await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> ViewerResult<()> {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );

    let mut options = match &cli.options {
        Some(path) => ViewerOptions::load_from_path(path)?,
        None => ViewerOptions::default(),
    };
    if cli.no_text {
        options.render_text = false;
    }
    let debounce = Duration::from_millis(options.debounce_ms);

    let state = Arc::new(HeadlessState::new(cli.width, cli.height));
    let mut viewer = ViewerBuilder::new()
        .viewport(Box::new(HeadlessViewport {
            state: Arc::clone(&state),
        }))
        .path(&cli.path)
        .options(options)
        .open()?;
    viewer.add_event_listener("load", |_| log::info!("document loaded"));
    viewer.add_event_listener("pagechanged", |event| {
        if let ViewerEvent::PageChanged { current_page } = event {
            log::info!("current page -> {current_page}");
        }
    });

    wait_for_ready(&viewer).await?;
    log::info!(
        "{} pages, viewport {}x{}",
        viewer.page_count(),
        cli.width,
        cli.height
    );
    // Let the initial windowing pass establish a current page.
    for _ in 0..200 {
        if viewer.current_page() != 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    // Walk the document top to bottom, letting each debounced pass settle.
    let step = cli.step.max(1.0);
    let mut offset = 0.0;
    loop {
        tokio::time::sleep(debounce + Duration::from_millis(80)).await;
        log::info!(
            "offset {:>8.0}: page {}/{}, {} live pixel layers",
            state.scroll(),
            viewer.current_page(),
            viewer.page_count(),
            viewer.live_pixel_layers()
        );
        if viewer.current_page() == viewer.page_count() || viewer.current_page() == 0 {
            break;
        }
        offset += step;
        state.set_scroll(offset);
        viewer.notify_scroll();
    }

    log::info!(
        "session done: {} frames decoded, {} text runs placed",
        state.frames.load(Ordering::Relaxed),
        state.runs.load(Ordering::Relaxed)
    );
    viewer.destroy();
    Ok(())
}

async fn wait_for_ready(viewer: &Viewer) -> ViewerResult<()> {
    for _ in 0..600 {
        if viewer.is_ready() {
            return Ok(());
        }
        if let Some(message) = viewer.open_error() {
            return Err(ViewerError::document_open(message));
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    Err(ViewerError::document_open(
        "timed out waiting for the document to open",
    ))
}

struct HeadlessState {
    width: f32,
    height: f32,
    scroll: Mutex<f32>,
    frames: AtomicUsize,
    runs: AtomicUsize,
}

impl HeadlessState {
    fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            scroll: Mutex::new(0.0),
            frames: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
        }
    }

    fn scroll(&self) -> f32 {
        *self.scroll.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_scroll(&self, offset: f32) {
        *self
            .scroll
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = offset;
    }
}

struct HeadlessViewport {
    state: Arc<HeadlessState>,
}

impl Viewport for HeadlessViewport {
    fn client_width(&self) -> f32 {
        self.state.width
    }

    fn client_height(&self) -> f32 {
        self.state.height
    }

    fn scroll_offset(&self) -> f32 {
        self.state.scroll()
    }

    fn set_scroll_offset(&mut self, offset: f32) {
        self.state.set_scroll(offset);
    }

    fn apply_chrome(&mut self, chrome: &ViewportChrome) {
        log::debug!(
            "chrome: padding {}, background {}, border {}",
            chrome.side_padding,
            chrome.background_color,
            chrome.border_style
        );
    }

    fn create_page_slot(&mut self, page_number: usize) -> Box<dyn PageSlot> {
        Box::new(HeadlessSlot {
            page_number,
            state: Arc::clone(&self.state),
        })
    }
}

struct HeadlessSlot {
    page_number: usize,
    state: Arc<HeadlessState>,
}

impl PageSlot for HeadlessSlot {
    fn set_layout(&mut self, width: f32, height: f32, bottom_margin: f32) {
        log::debug!(
            "page {}: layout {width:.0}x{height:.0} (+{bottom_margin:.0})",
            self.page_number
        );
    }

    fn set_loading_visible(&mut self, _visible: bool) {}

    fn create_pixel_surface(&mut self, _width: f32, _height: f32) -> Box<dyn PixelSurface> {
        Box::new(HeadlessPixels {
            page_number: self.page_number,
            state: Arc::clone(&self.state),
        })
    }

    fn create_text_surface(&mut self, _width: f32, _height: f32) -> Box<dyn TextSurface> {
        Box::new(HeadlessText {
            page_number: self.page_number,
            state: Arc::clone(&self.state),
        })
    }

    fn create_highlight_overlay(
        &mut self,
        rect: OverlayRect,
        color: &str,
        opacity: f32,
    ) -> Box<dyn HighlightOverlay> {
        log::debug!(
            "page {}: highlight {color} ({opacity}) at {:.0},{:.0} {:.0}x{:.0}",
            self.page_number,
            rect.x,
            rect.y,
            rect.width,
            rect.height
        );
        Box::new(HeadlessOverlay)
    }

    fn remove(&mut self) {
        log::debug!("page {}: removed", self.page_number);
    }
}

struct HeadlessPixels {
    page_number: usize,
    state: Arc<HeadlessState>,
}

impl PixelSurface for HeadlessPixels {
    fn put_frame(&mut self, frame: PixelFrame) {
        self.state.frames.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "page {}: {}x{} frame ({} bytes)",
            self.page_number,
            frame.width,
            frame.height,
            frame.byte_len()
        );
    }

    fn attach(&mut self) {}

    fn detach(&mut self) {
        log::debug!("page {}: pixel layer evicted", self.page_number);
    }
}

struct HeadlessText {
    page_number: usize,
    state: Arc<HeadlessState>,
}

impl TextSurface for HeadlessText {
    fn place_run(&mut self, run: &TextRun) {
        self.state.runs.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "page {}: run at {:.0},{:.0}: {:?}",
            self.page_number,
            run.x,
            run.y,
            run.text
        );
    }

    fn attach(&mut self) {}

    fn detach(&mut self) {}
}

struct HeadlessOverlay;

impl HighlightOverlay for HeadlessOverlay {
    fn detach(&mut self) {}
}
