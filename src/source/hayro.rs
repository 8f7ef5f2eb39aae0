use std::sync::Arc;

use futures_util::future::BoxFuture;
use hayro::hayro_interpret::font::Glyph;
use hayro::hayro_interpret::util::{PageExt, RectExt};
use hayro::hayro_interpret::{
    BlendMode, ClipPath, Context, Device, GlyphDrawMode, Image, InterpreterSettings, Paint,
    PathDrawMode, SoftMask, interpret_page,
};
use hayro::hayro_syntax::Pdf;
use hayro::hayro_syntax::page::Page;
use hayro::vello_cpu::color::palette::css::WHITE;
use hayro::{RenderSettings, render};
use kurbo::{Affine, BezPath, Point};

use crate::error::{ViewerError, ViewerResult};
use crate::source::traits::{
    DocumentHandle, DocumentLocator, DocumentSource, OpenOptions, PageHandle,
};
use crate::source::worker::{DecodeBackend, DecodeClient, DecodeWorker};
use crate::surface::{PixelFrame, PixelSurface, TextRun, TextSurface};

/// The shipped document source: decodes PDFs with hayro on a dedicated
/// blocking worker.
#[derive(Debug, Default)]
pub struct HayroSource;

impl DocumentSource for HayroSource {
    fn open(
        &self,
        locator: DocumentLocator,
        options: OpenOptions,
    ) -> BoxFuture<'static, ViewerResult<Arc<dyn DocumentHandle>>> {
        Box::pin(async move {
            if options.char_map.is_some() {
                log::debug!("character-map options are ignored by the hayro source");
            }
            let bytes = load_shared_bytes(&locator)?;
            let worker = DecodeWorker::spawn(move || {
                HayroBackend::open(bytes).map(|backend| Box::new(backend) as Box<dyn DecodeBackend>)
            })
            .await?;

            Ok(Arc::new(HayroDocument { worker }) as Arc<dyn DocumentHandle>)
        })
    }
}

pub(crate) fn load_shared_bytes(locator: &DocumentLocator) -> ViewerResult<Arc<Vec<u8>>> {
    let bytes = match locator {
        DocumentLocator::Bytes(bytes) => Arc::clone(bytes),
        DocumentLocator::Path(path) => {
            if path.as_os_str().is_empty() {
                return Err(ViewerError::invalid_argument(
                    "document path must not be empty",
                ));
            }
            if !path.exists() {
                return Err(ViewerError::io_with_context(
                    std::io::Error::new(std::io::ErrorKind::NotFound, "missing file"),
                    format!("document not found: {}", path.display()),
                ));
            }
            if !path.is_file() {
                return Err(ViewerError::invalid_argument(
                    "document path must be a regular file",
                ));
            }
            Arc::new(std::fs::read(path)?)
        }
    };

    if !bytes.as_slice().starts_with(b"%PDF-") {
        return Err(ViewerError::document_open(
            "input does not carry a PDF header",
        ));
    }
    Ok(bytes)
}

struct HayroDocument {
    worker: DecodeWorker,
}

impl DocumentHandle for HayroDocument {
    fn page_count(&self) -> usize {
        self.worker.page_count()
    }

    fn page(&self, number: usize) -> BoxFuture<'_, ViewerResult<Arc<dyn PageHandle>>> {
        Box::pin(async move {
            let size = self
                .worker
                .client()
                .page_info(number)
                .await
                .map_err(|err| ViewerError::page_fetch(number, err))?;
            Ok(Arc::new(HayroPage {
                client: self.worker.client(),
                number,
                size,
            }) as Arc<dyn PageHandle>)
        })
    }

    fn cleanup(&self) {
        // The worker keeps no per-page caches between requests.
        log::debug!("hayro document cleanup requested");
    }

    fn destroy(&self) {
        self.worker.client().shutdown();
    }
}

struct HayroPage {
    client: DecodeClient,
    number: usize,
    size: (f32, f32),
}

impl PageHandle for HayroPage {
    fn intrinsic_size(&self) -> (f32, f32) {
        self.size
    }

    fn render_pixels<'a>(
        &'a self,
        target: &'a mut dyn PixelSurface,
        scale: f32,
    ) -> BoxFuture<'a, ViewerResult<()>> {
        Box::pin(async move {
            let frame = self
                .client
                .render_pixels(self.number, scale)
                .await
                .map_err(|err| ViewerError::page_render(self.number, err))?;
            target.put_frame(frame);
            Ok(())
        })
    }

    fn render_text<'a>(
        &'a self,
        target: &'a mut dyn TextSurface,
        scale: f32,
    ) -> BoxFuture<'a, ViewerResult<()>> {
        Box::pin(async move {
            let runs = self
                .client
                .page_text(self.number)
                .await
                .map_err(|err| ViewerError::page_render(self.number, err))?;
            for run in &runs {
                target.place_run(&run.scaled(scale));
            }
            Ok(())
        })
    }

    fn cleanup(&self) {
        self.client.page_cleanup(self.number);
    }
}

/// Owns the parsed document inside the decode worker.
struct HayroBackend {
    pdf: Pdf,
}

impl HayroBackend {
    fn open(bytes: Arc<Vec<u8>>) -> ViewerResult<Self> {
        let pdf = Pdf::new(bytes)
            .map_err(|_| ViewerError::document_open("failed to parse PDF with hayro"))?;
        Ok(Self { pdf })
    }

    fn page_ref(&self, index: usize) -> ViewerResult<&Page<'_>> {
        self.pdf
            .pages()
            .get(index)
            .ok_or_else(|| ViewerError::invalid_argument("page index is out of range"))
    }
}

impl DecodeBackend for HayroBackend {
    fn page_count(&self) -> usize {
        self.pdf.pages().len()
    }

    fn page_info(&self, index: usize) -> ViewerResult<(f32, f32)> {
        Ok(self.page_ref(index)?.render_dimensions())
    }

    fn render_pixels(&self, index: usize, scale: f32) -> ViewerResult<PixelFrame> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ViewerError::invalid_argument(
                "scale must be a positive finite value",
            ));
        }

        let page_ref = self.page_ref(index)?;
        let render_settings = RenderSettings {
            x_scale: scale,
            y_scale: scale,
            bg_color: WHITE,
            ..Default::default()
        };
        let pixmap = render(page_ref, &InterpreterSettings::default(), &render_settings);

        Ok(PixelFrame {
            width: pixmap.width() as u32,
            height: pixmap.height() as u32,
            pixels: pixmap.data_as_u8_slice().to_vec().into(),
        })
    }

    fn text_runs(&self, index: usize) -> ViewerResult<Vec<TextRun>> {
        let page_ref = self.page_ref(index)?;
        let mut context = Context::new(
            page_ref.initial_transform(true),
            page_ref.intersected_crop_box().to_kurbo(),
            page_ref.xref(),
            InterpreterSettings::default(),
        );
        let mut collector = RunCollector::default();
        interpret_page(page_ref, &mut context, &mut collector);
        Ok(collector.finish())
    }

    fn release_page(&self, _index: usize) {
        // Pages are views into the parsed document; nothing is retained per
        // page between requests.
    }
}

const LINE_BREAK_THRESHOLD: f64 = 6.0;

/// Interpreter device grouping glyphs into positioned text runs. A run ends
/// at an explicit newline or when the baseline jumps by more than
/// [`LINE_BREAK_THRESHOLD`] device units.
#[derive(Default)]
struct RunCollector {
    runs: Vec<TextRun>,
    current: String,
    start: Option<Point>,
    last: Option<Point>,
    last_glyph: Option<(char, i32, i32)>,
}

impl RunCollector {
    fn finish(mut self) -> Vec<TextRun> {
        self.flush();
        self.runs
    }

    fn flush(&mut self) {
        let text = self.current.trim_end();
        if !text.is_empty() {
            let start = self.start.unwrap_or(Point::ORIGIN);
            self.runs.push(TextRun {
                text: text.to_owned(),
                x: start.x as f32,
                y: start.y as f32,
            });
        }
        self.current.clear();
        self.start = None;
    }

    fn push_char(&mut self, ch: char, x: f64, y: f64) {
        if ch == '\n' || ch == '\r' {
            self.flush();
            self.last = Some(Point::new(x, y));
            return;
        }

        if let Some(last) = self.last
            && (y - last.y).abs() > LINE_BREAK_THRESHOLD
        {
            self.flush();
        }

        if ch.is_whitespace() {
            if !self.current.is_empty() && !self.current.ends_with(' ') {
                self.current.push(' ');
            }
        } else {
            if self.current.is_empty() {
                self.start = Some(Point::new(x, y));
            }
            self.current.push(ch);
        }
        self.last = Some(Point::new(x, y));
    }

    fn is_duplicate_glyph(&self, ch: char, x: f64, y: f64) -> bool {
        self.last_glyph == Some((ch, quantize_coord(x), quantize_coord(y)))
    }

    fn set_last_glyph(&mut self, ch: char, x: f64, y: f64) {
        self.last_glyph = Some((ch, quantize_coord(x), quantize_coord(y)));
    }
}

fn quantize_coord(value: f64) -> i32 {
    (value * 100.0).round() as i32
}

impl<'a> Device<'a> for RunCollector {
    fn set_soft_mask(&mut self, _mask: Option<SoftMask<'a>>) {}

    fn set_blend_mode(&mut self, _blend_mode: BlendMode) {}

    fn draw_path(
        &mut self,
        _path: &BezPath,
        _transform: Affine,
        _paint: &Paint<'a>,
        _draw_mode: &PathDrawMode,
    ) {
    }

    fn push_clip_path(&mut self, _clip_path: &ClipPath) {}

    fn push_transparency_group(
        &mut self,
        _opacity: f32,
        _mask: Option<SoftMask<'a>>,
        _blend_mode: BlendMode,
    ) {
    }

    fn draw_glyph(
        &mut self,
        glyph: &Glyph<'a>,
        transform: Affine,
        glyph_transform: Affine,
        _paint: &Paint<'a>,
        _draw_mode: &GlyphDrawMode,
    ) {
        let Some(ch) = glyph.as_unicode() else {
            return;
        };

        let position = (transform * glyph_transform) * Point::ORIGIN;
        if self.is_duplicate_glyph(ch, position.x, position.y) {
            return;
        }

        self.set_last_glyph(ch, position.x, position.y);
        self.push_char(ch, position.x, position.y);
    }

    fn draw_image(&mut self, _image: Image<'a, '_>, _transform: Affine) {}

    fn pop_clip_path(&mut self) {}

    fn pop_transparency_group(&mut self) {}
}
