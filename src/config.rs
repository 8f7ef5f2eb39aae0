use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ViewerError, ViewerResult};

/// Width reserved for the container's vertical scrollbar so a rendered page
/// never forces horizontal overflow.
pub(crate) const SCROLLBAR_MARGIN: f32 = 10.0;

/// Overlay opacity used when the viewer-level highlight call does not carry
/// one.
pub(crate) const DEFAULT_HIGHLIGHT_OPACITY: f32 = 0.5;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewerOptions {
    /// Render the selectable text layer on top of the pixel layer.
    pub render_text: bool,
    /// Vertical gap between consecutive pages, in pixels.
    pub page_gap: f32,
    /// Left and right container padding, in pixels.
    pub side_padding: f32,
    pub background_color: String,
    pub border_style: String,
    /// Lookahead buffer size for the windowing policy: pages within
    /// `container_height + (window_span / 2) * (page_height + page_gap)` of
    /// the viewport keep live rendered content. Larger values trade memory
    /// for scroll smoothness.
    pub window_span: usize,
    /// Trailing debounce applied to scroll and resize bursts.
    pub debounce_ms: u64,
    /// Page height assumed before a page's intrinsic size is known.
    pub placeholder_height: f32,
    pub char_map: Option<CharMapLocation>,
}

/// Character-map location forwarded to the document source. Sources that
/// need no external character maps ignore it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CharMapLocation {
    pub url: String,
    pub packed: bool,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            render_text: true,
            page_gap: 10.0,
            side_padding: 20.0,
            background_color: "#808080".to_string(),
            border_style: "none".to_string(),
            window_span: 10,
            debounce_ms: 150,
            placeholder_height: 500.0,
            char_map: None,
        }
    }
}

impl ViewerOptions {
    pub fn load_from_path(path: impl AsRef<Path>) -> ViewerResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        if !path.is_file() {
            return Err(ViewerError::invalid_argument(format!(
                "options path is not a regular file: {}",
                path.display()
            )));
        }

        let raw = fs::read_to_string(path).map_err(|source| {
            ViewerError::io_with_context(
                source,
                format!("failed to read options: {}", path.display()),
            )
        })?;
        let parsed = toml::from_str::<Self>(&raw).map_err(|source| {
            ViewerError::invalid_argument(format!(
                "failed to parse options {}: {source}",
                path.display()
            ))
        })?;
        Ok(parsed.sanitized())
    }

    pub(crate) fn sanitized(mut self) -> Self {
        self.window_span = self.window_span.max(1);
        self.debounce_ms = self.debounce_ms.max(1);
        if !self.page_gap.is_finite() || self.page_gap < 0.0 {
            self.page_gap = 0.0;
        }
        if !self.side_padding.is_finite() || self.side_padding < 0.0 {
            self.side_padding = 0.0;
        }
        if !self.placeholder_height.is_finite() || self.placeholder_height <= 0.0 {
            self.placeholder_height = ViewerOptions::default().placeholder_height;
        }
        self
    }
}
