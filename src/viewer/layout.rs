//! Pure windowing geometry. Decisions are made from cumulative page
//! geometry, never from surface measurement, so one linear pass suffices.

/// Half-open inclusion range around the viewport: a page whose relative top
/// falls strictly inside `(-window, +window)` keeps live rendered content.
/// `window_span` pages worth of slack amortize churn from small scroll
/// deltas and give fetches a head start before a page becomes visible.
pub(crate) fn inclusion_window(
    container_height: f32,
    window_span: usize,
    page_height: f32,
    gap: f32,
) -> f32 {
    container_height + (window_span as f32 / 2.0) * (page_height + gap)
}

pub(crate) fn is_in_window(relative_top: f32, window: f32) -> bool {
    relative_top < window && relative_top > -window
}

/// Whether the page's vertical span contains the viewport's top edge.
pub(crate) fn holds_viewport_top(relative_top: f32, page_height: f32) -> bool {
    relative_top <= 0.0 && relative_top + page_height > 0.0
}

/// Top offset of a page given the heights of every page before it.
pub(crate) fn page_top(prior_heights: impl IntoIterator<Item = f32>, gap: f32) -> f32 {
    prior_heights
        .into_iter()
        .map(|height| height + gap)
        .sum()
}
