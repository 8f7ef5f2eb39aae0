use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::ViewerOptions;
use crate::error::ViewerError;
use crate::event::ViewerEvent;
use crate::source::DocumentLocator;
use crate::testing::{MockSource, MockSourceConfig, MockViewport, SourceProbe, ViewportProbe};
use crate::viewer::{Viewer, ViewerBuilder};

/// Test geometry: viewport 310x500 with no side padding gives pages a
/// 300px target width after the scrollbar margin, so 600x800 mock pages
/// render at scale 0.5 (400px tall, 410 per page with the default gap).
fn test_options() -> ViewerOptions {
    ViewerOptions {
        side_padding: 0.0,
        debounce_ms: 30,
        ..ViewerOptions::default()
    }
}

fn build_viewer(
    config: MockSourceConfig,
    options: ViewerOptions,
) -> (Viewer, Arc<ViewportProbe>, Arc<SourceProbe>) {
    let viewport_probe = ViewportProbe::sized(310.0, 500.0);
    let (source, source_probe) = MockSource::new(config);
    let viewer = ViewerBuilder::new()
        .viewport(Box::new(MockViewport::new(Arc::clone(&viewport_probe))))
        .source(Arc::new(source))
        .locator(DocumentLocator::bytes(vec![0x00]))
        .options(options)
        .open()
        .expect("viewer should construct");
    (viewer, viewport_probe, source_probe)
}

async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting until {what}");
}

async fn ready_viewer(
    config: MockSourceConfig,
    options: ViewerOptions,
) -> (Viewer, Arc<ViewportProbe>, Arc<SourceProbe>) {
    let (viewer, viewport_probe, source_probe) = build_viewer(config, options);
    wait_until(|| viewer.is_ready(), "viewer becomes ready").await;
    (viewer, viewport_probe, source_probe)
}

async fn settled_viewer(
    config: MockSourceConfig,
    options: ViewerOptions,
    expected_layers: usize,
) -> (Viewer, Arc<ViewportProbe>, Arc<SourceProbe>) {
    let (viewer, viewport_probe, source_probe) = ready_viewer(config, options).await;
    wait_until(
        || viewer.live_pixel_layers() == expected_layers,
        "initial renders settle",
    )
    .await;
    (viewer, viewport_probe, source_probe)
}

fn page_change_recorder(viewer: &Viewer) -> Arc<Mutex<Vec<usize>>> {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changes);
    viewer.add_event_listener("pagechanged", move |event| {
        if let ViewerEvent::PageChanged { current_page } = event {
            sink.lock().expect("recorder should lock").push(*current_page);
        }
    });
    changes
}

#[test]
fn builder_fails_fast_without_viewport_or_locator() {
    let missing_viewport = ViewerBuilder::new().bytes(vec![0x00]).open();
    assert!(matches!(missing_viewport, Err(ViewerError::Config(_))));
}

#[tokio::test]
async fn builder_fails_fast_without_locator() {
    let probe = ViewportProbe::sized(310.0, 500.0);
    let missing_locator = ViewerBuilder::new()
        .viewport(Box::new(MockViewport::new(probe)))
        .open();
    assert!(matches!(missing_locator, Err(ViewerError::Config(_))));
}

#[tokio::test]
async fn load_fires_once_after_the_initial_pass() {
    let (viewer, _, _) = build_viewer(MockSourceConfig::default(), test_options());
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    viewer.add_event_listener("load", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    wait_until(|| viewer.is_ready(), "viewer becomes ready").await;
    wait_until(|| loads.load(Ordering::SeqCst) == 1, "load fires").await;

    viewer.render(true).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn chrome_is_applied_at_construction() {
    let (viewer, viewport_probe, _) =
        ready_viewer(MockSourceConfig::default(), ViewerOptions::default()).await;

    let chrome = viewport_probe
        .chrome
        .lock()
        .expect("chrome should lock")
        .clone()
        .expect("chrome should be applied");
    assert_eq!(chrome.side_padding, 20.0);
    assert_eq!(chrome.background_color, "#808080");
    assert_eq!(chrome.border_style, "none");
    assert_eq!(viewer.page_count(), 3);
}

#[tokio::test]
async fn empty_document_becomes_ready_with_no_pages_and_still_loads() {
    let config = MockSourceConfig {
        page_count: 0,
        ..MockSourceConfig::default()
    };
    let (viewer, _, _) = build_viewer(config, test_options());
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    viewer.add_event_listener("load", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    wait_until(|| viewer.is_ready(), "viewer becomes ready").await;
    wait_until(|| loads.load(Ordering::SeqCst) == 1, "load fires").await;
    assert_eq!(viewer.page_count(), 0);
    assert_eq!(viewer.current_page(), 0);
}

#[tokio::test]
async fn current_page_follows_the_viewport_top_edge() {
    let (viewer, viewport_probe, _) =
        settled_viewer(MockSourceConfig::default(), test_options(), 3).await;
    let changes = page_change_recorder(&viewer);
    assert_eq!(viewer.current_page(), 1);

    // Scrolled to 410 the second page's span contains the viewport top.
    viewport_probe.set_scroll(410.0);
    viewer.render(false).await;
    assert_eq!(viewer.current_page(), 2);

    // A pass with no change emits nothing.
    viewer.render(false).await;
    assert_eq!(
        changes.lock().expect("recorder should lock").as_slice(),
        &[2]
    );
}

#[tokio::test]
async fn current_page_is_zero_when_no_span_contains_the_top_edge() {
    let (viewer, viewport_probe, _) =
        settled_viewer(MockSourceConfig::default(), test_options(), 3).await;

    // Past the last page's bottom (3 * 410 = 1230) but still in-window.
    viewport_probe.set_scroll(2000.0);
    viewer.render(false).await;
    assert_eq!(viewer.current_page(), 0);

    // Back inside the gap between pages 1 and 2 the top edge belongs to
    // the following page.
    viewport_probe.set_scroll(405.0);
    viewer.render(false).await;
    assert_eq!(viewer.current_page(), 2);
}

#[tokio::test]
async fn far_pages_are_revoked_keeping_live_layers_bounded() {
    let config = MockSourceConfig {
        page_count: 100,
        ..MockSourceConfig::default()
    };
    let (viewer, viewport_probe, _) = ready_viewer(config, test_options()).await;
    wait_until(|| viewer.live_pixel_layers() >= 6, "initial renders settle").await;

    viewport_probe.set_scroll(20000.0);
    viewer.render(false).await;
    wait_until(
        || viewer.live_pixel_layers() >= 10,
        "mid-document renders settle",
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The inclusion window caps live pixel layers at roughly the span plus
    // the visible pages, for any offset and document length.
    assert!(viewer.live_pixel_layers() <= 13);
    assert!(viewer.current_page() > 1);
    // The pages rendered around offset 0 gave their layers back.
    assert!(!viewport_probe.slot(0).pixel_layer_live());
    assert!(!viewport_probe.slot(1).pixel_layer_live());
}

#[tokio::test]
async fn rewindowed_page_restores_layers_and_highlights_without_reregistration() {
    let (viewer, viewport_probe, source_probe) =
        settled_viewer(MockSourceConfig::default(), test_options(), 3).await;

    let id = viewer.highlight(1, 10.0, 10.0, 50.0, 20.0, "yellow");
    assert!(!id.is_none());
    let slot = viewport_probe.slot(0);
    assert_eq!(slot.attached_overlay_count(), 1);

    // Evict everything, then come back.
    viewport_probe.set_scroll(99_999.0);
    viewer.render(false).await;
    assert_eq!(viewer.live_pixel_layers(), 0);
    assert_eq!(slot.attached_overlay_count(), 0);
    let page_probe = source_probe
        .page_probe(1)
        .expect("page 1 should have been fetched");
    assert_eq!(page_probe.cleanups.load(Ordering::SeqCst), 1);

    viewport_probe.set_scroll(0.0);
    viewer.render(false).await;
    wait_until(|| viewer.live_pixel_layers() == 3, "renders come back").await;
    wait_until(
        || slot.attached_overlay_count() == 1,
        "highlight overlay reattaches",
    )
    .await;

    // The page was fetched again; the highlight definition was not
    // re-registered by the caller.
    assert_eq!(
        source_probe
            .fetches()
            .iter()
            .filter(|number| **number == 1)
            .count(),
        2
    );
}

#[tokio::test]
async fn scroll_to_aligns_page_tops_and_scales_offsets() {
    let (viewer, viewport_probe, _) =
        settled_viewer(MockSourceConfig::default(), test_options(), 3).await;

    viewer
        .scroll_to(2, 0.0, true)
        .await
        .expect("scroll_to should succeed");
    assert_eq!(viewport_probe.scroll(), 410.0);

    // Intrinsic offset 100 is 50 rendered pixels at scale 0.5.
    viewer
        .scroll_to(2, 100.0, true)
        .await
        .expect("scroll_to should succeed");
    assert_eq!(viewport_probe.scroll(), 460.0);

    // Already-scaled offsets are used verbatim.
    viewer
        .scroll_to(3, 100.0, false)
        .await
        .expect("scroll_to should succeed");
    assert_eq!(viewport_probe.scroll(), 920.0);
}

#[tokio::test]
async fn scroll_to_out_of_range_is_a_silent_no_op() {
    let (viewer, viewport_probe, _) =
        settled_viewer(MockSourceConfig::default(), test_options(), 3).await;

    viewer
        .scroll_to(0, 50.0, true)
        .await
        .expect("out-of-range scroll_to should not error");
    viewer
        .scroll_to(4, 50.0, true)
        .await
        .expect("out-of-range scroll_to should not error");

    assert!(
        viewport_probe
            .scroll_sets
            .lock()
            .expect("scroll sets should lock")
            .is_empty()
    );
}

#[tokio::test]
async fn scroll_to_an_unbound_page_fetches_it_for_accurate_scale() {
    let config = MockSourceConfig {
        page_count: 30,
        ..MockSourceConfig::default()
    };
    let (viewer, viewport_probe, source_probe) = ready_viewer(config, test_options()).await;
    wait_until(|| viewer.live_pixel_layers() == 6, "initial renders settle").await;

    viewer
        .scroll_to(30, 100.0, true)
        .await
        .expect("scroll_to should succeed");

    // Pages 1-6 measure 410 each, the 23 placeholder pages 510 each, and
    // the intrinsic offset maps to 50 rendered pixels at scale 0.5.
    assert_eq!(viewport_probe.scroll(), 6.0 * 410.0 + 23.0 * 510.0 + 50.0);
    assert!(source_probe.fetches().contains(&30));
}

#[tokio::test]
async fn viewer_highlights_scale_and_remove_by_id() {
    let (viewer, viewport_probe, _) =
        settled_viewer(MockSourceConfig::default(), test_options(), 3).await;

    let id = viewer.highlight(1, 10.0, 10.0, 50.0, 20.0, "yellow");
    assert!(!id.is_none());
    let slot = viewport_probe.slot(0);
    let overlay = slot.last_overlay().expect("overlay should be recorded");
    assert_eq!(
        (overlay.x, overlay.y, overlay.width, overlay.height),
        (5.0, 5.0, 25.0, 10.0)
    );
    assert_eq!(
        slot.last_overlay_style(),
        Some(("yellow".to_string(), 0.5))
    );

    viewer.remove_highlight(1, &id);
    assert_eq!(slot.attached_overlay_count(), 0);

    // The id is forgotten, so a later sweep has nothing left for it.
    viewer.remove_all_highlights();
    assert_eq!(slot.attached_overlay_count(), 0);
}

#[tokio::test]
async fn out_of_range_highlight_calls_are_benign() {
    let (viewer, _, _) = settled_viewer(MockSourceConfig::default(), test_options(), 3).await;

    let id = viewer.highlight(4, 10.0, 10.0, 50.0, 20.0, "yellow");
    assert!(id.is_none());
    viewer.remove_highlight(4, &id);
    viewer.remove_highlight(0, &id);
}

#[tokio::test]
async fn unknown_event_names_are_benign() {
    let (mut viewer, _, _) = ready_viewer(MockSourceConfig::default(), test_options()).await;

    let id = viewer.add_event_listener("scrollend", |_| {});
    assert!(id.is_none());
    viewer.remove_event_listener("scrollend", id);
}

#[tokio::test]
async fn open_failure_leaves_the_viewer_not_ready_with_a_retained_error() {
    let config = MockSourceConfig {
        fail_open: true,
        ..MockSourceConfig::default()
    };
    let (viewer, _, _) = build_viewer(config, test_options());
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    viewer.add_event_listener("load", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    wait_until(|| viewer.open_error().is_some(), "open error is retained").await;

    assert!(!viewer.is_ready());
    assert_eq!(viewer.current_page(), 0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn a_failed_page_fetch_does_not_abort_the_pass_for_other_pages() {
    let config = MockSourceConfig {
        fail_fetch: HashSet::from([2]),
        ..MockSourceConfig::default()
    };
    let (viewer, viewport_probe, _) = ready_viewer(config, test_options()).await;
    wait_until(|| viewer.live_pixel_layers() == 2, "other pages settle").await;

    // The failed page keeps its loading placeholder up.
    let slot = viewport_probe.slot(1);
    assert!(slot.loading_visible.load(Ordering::SeqCst));
    assert_eq!(slot.frames_put.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn a_failed_render_keeps_the_loading_placeholder() {
    let config = MockSourceConfig {
        fail_pixels: HashSet::from([1]),
        ..MockSourceConfig::default()
    };
    let (viewer, viewport_probe, _) = ready_viewer(config, test_options()).await;
    wait_until(|| viewer.live_pixel_layers() == 2, "other pages settle").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let slot = viewport_probe.slot(0);
    assert!(slot.loading_visible.load(Ordering::SeqCst));
    assert!(!slot.pixel_layer_live());
    assert_eq!(viewer.live_pixel_layers(), 2);
}

#[tokio::test]
async fn a_stale_fetch_result_is_discarded_after_revoke() {
    let config = MockSourceConfig {
        page_count: 1,
        fetch_delay: Duration::from_millis(100),
        ..MockSourceConfig::default()
    };
    let (viewer, viewport_probe, source_probe) = ready_viewer(config, test_options()).await;
    wait_until(|| source_probe.fetches().len() == 1, "fetch starts").await;

    // Evict the page while its fetch is still in flight.
    viewport_probe.set_scroll(99_999.0);
    viewer.render(false).await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    // The late handle was released, never bound, never rendered.
    let page_probe = source_probe
        .page_probe(1)
        .expect("page 1 fetch should have completed");
    assert_eq!(page_probe.cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(page_probe.pixel_renders.load(Ordering::SeqCst), 0);
    assert_eq!(viewer.live_pixel_layers(), 0);
    assert_eq!(source_probe.fetches().len(), 1);
}

#[tokio::test]
async fn scroll_bursts_coalesce_into_one_windowing_pass() {
    let (mut viewer, viewport_probe, _) =
        settled_viewer(MockSourceConfig::default(), test_options(), 3).await;
    let reads_before = viewport_probe.scroll_reads.load(Ordering::SeqCst);

    viewport_probe.set_scroll(100.0);
    viewer.notify_scroll();
    viewport_probe.set_scroll(200.0);
    viewer.notify_scroll();
    viewport_probe.set_scroll(410.0);
    viewer.notify_scroll();

    wait_until(|| viewer.current_page() == 2, "debounced pass runs").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Each pass reads the scroll offset exactly once.
    assert_eq!(
        viewport_probe.scroll_reads.load(Ordering::SeqCst),
        reads_before + 1
    );
}

#[tokio::test]
async fn resize_reflows_pages_and_forces_a_rerender() {
    let (mut viewer, viewport_probe, _) =
        settled_viewer(MockSourceConfig::default(), test_options(), 3).await;
    let slot = viewport_probe.slot(0);
    assert_eq!(slot.layout(), Some((300.0, 400.0, 10.0)));
    assert_eq!(slot.pixel_surfaces_created.load(Ordering::SeqCst), 1);

    viewport_probe.set_width(210.0);
    viewer.notify_resize();

    wait_until(
        || slot.pixel_surfaces_created.load(Ordering::SeqCst) == 2,
        "forced rerender rebuilds layers",
    )
    .await;
    wait_until(|| slot.pixel_layer_live(), "rebuilt layer attaches").await;

    // 210 wide minus the scrollbar margin is 200: scale 1/3, height 800/3.
    let (width, height, gap) = slot.layout().expect("layout should be recorded");
    assert_eq!(width, 200.0);
    assert!((height - 800.0 / 3.0).abs() < 1e-3);
    assert_eq!(gap, 10.0);
}

#[tokio::test]
async fn destroy_cascades_to_pages_and_releases_the_document() {
    let (viewer, viewport_probe, source_probe) =
        settled_viewer(MockSourceConfig::default(), test_options(), 3).await;

    viewer.destroy();

    for index in 0..3 {
        assert!(viewport_probe.slot(index).removed.load(Ordering::SeqCst));
    }
    assert_eq!(source_probe.doc_cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(source_probe.doc_destroys.load(Ordering::SeqCst), 1);
}
