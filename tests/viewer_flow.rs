use std::sync::Arc;
use std::time::Duration;

use flipbook::pdf::{BaseLayer, FlipPhase, PreloadConfig};
use flipbook::test_utils::test_helpers::{ScriptedRenderer, ScriptedSource, doc};
use flipbook::{
    FlipDirection, FlipEvent, FlipStart, PageSlot, Viewer, ViewerConfig, ViewerStatus,
};

const WAIT: Duration = Duration::from_secs(5);

fn no_preload() -> ViewerConfig {
    ViewerConfig {
        preload: None,
        ..ViewerConfig::default()
    }
}

fn viewer_for(renderer: &Arc<ScriptedRenderer>, config: ViewerConfig) -> Viewer {
    let source = ScriptedSource::new().with_document(doc("issue.pdf"), renderer.clone(), 0.7);
    let mut viewer = Viewer::new(Arc::new(source), config);
    viewer.open(&doc("issue.pdf")).unwrap();
    viewer
}

fn slot_pages(base: &BaseLayer) -> (Option<u32>, Option<u32>) {
    match base {
        BaseLayer::Spread { left, right } => (left.page(), right.page()),
        other => panic!("expected a spread, got {other:?}"),
    }
}

/// Run a started desktop flip through mount, prep frames and settle
fn complete_flip(viewer: &mut Viewer) -> usize {
    assert!(matches!(
        viewer.wait_resolution(WAIT),
        Some(FlipEvent::Mounted(_))
    ));
    while viewer.on_animation_frame().is_none() {}
    viewer.on_transition_settled().expect("flip should settle")
}

#[test]
fn reading_a_five_page_issue_cover_to_back() {
    let renderer = Arc::new(ScriptedRenderer::new(5));
    let mut viewer = viewer_for(&renderer, no_preload());

    assert_eq!(viewer.status(), &ViewerStatus::Ready);
    assert_eq!(viewer.spread_count(), 4);
    assert_eq!(viewer.current_label(), "Cover (page 1 of 5)");
    assert!(!viewer.can_go_prev());

    let mut labels = vec![viewer.current_label()];
    while viewer.can_go_next() {
        assert!(matches!(viewer.next(), FlipStart::Resolving(_)));
        complete_flip(&mut viewer);
        labels.push(viewer.current_label());
    }

    assert_eq!(
        labels,
        vec![
            "Cover (page 1 of 5)",
            "Pages 2–3 of 5",
            "Back cover (page 4 of 5)",
            "Back cover (page 5 of 5)",
        ]
    );
    assert_eq!(viewer.next(), FlipStart::Ignored);
    assert!(viewer.can_go_prev());
}

#[test]
fn flip_layers_through_prep_and_run() {
    let renderer = Arc::new(ScriptedRenderer::new(6));
    let mut viewer = viewer_for(&renderer, no_preload());

    assert!(matches!(viewer.next(), FlipStart::Resolving(_)));
    let Some(FlipEvent::Mounted(key)) = viewer.wait_resolution(WAIT) else {
        panic!("expected the overlay to mount");
    };

    let layers = viewer.layers();
    let flip = layers.flip.expect("flip layer while transitioning");
    assert_eq!(flip.key, key);
    assert_eq!(flip.phase, FlipPhase::Prep);
    assert!(matches!(flip.under_left, PageSlot::Placeholder));
    assert_eq!(flip.under_right.page(), Some(3));
    assert_eq!(flip.front.page(), Some(1));
    assert_eq!(flip.back.page(), Some(2));
    assert!(flip.front.is_ready() && flip.back.is_ready() && flip.under_right.is_ready());

    // The committed spread stays in the base layer until the sheet lands
    assert_eq!(slot_pages(&layers.base), (None, Some(1)));
    assert!(!viewer.can_go_next());
    assert!(!viewer.can_go_prev());

    let mut frames = 1;
    while viewer.on_animation_frame().is_none() {
        frames += 1;
    }
    assert_eq!(frames, 2);
    assert_eq!(viewer.layers().flip.unwrap().phase, FlipPhase::Run);

    assert_eq!(viewer.on_transition_settled(), Some(1));
    let layers = viewer.layers();
    assert!(layers.flip.is_none());
    assert_eq!(slot_pages(&layers.base), (Some(2), Some(3)));
    assert_eq!(viewer.current_label(), "Pages 2–3 of 6");
}

#[test]
fn flipping_back_uses_prev_roles() {
    let renderer = Arc::new(ScriptedRenderer::new(6));
    let mut viewer = viewer_for(&renderer, no_preload());
    viewer.next();
    complete_flip(&mut viewer);
    viewer.next();
    complete_flip(&mut viewer);
    assert_eq!(viewer.current_spread().index, 2);

    assert!(matches!(viewer.prev(), FlipStart::Resolving(_)));
    assert!(matches!(
        viewer.wait_resolution(WAIT),
        Some(FlipEvent::Mounted(_))
    ));
    let flip = viewer.layers().flip.unwrap();
    assert_eq!(flip.key.direction, FlipDirection::Prev);
    assert_eq!(flip.front.page(), Some(4));
    assert_eq!(flip.back.page(), Some(3));
    assert_eq!(flip.under_left.page(), Some(2));
    assert_eq!(flip.under_right.page(), Some(5));

    while viewer.on_animation_frame().is_none() {}
    assert_eq!(viewer.on_transition_settled(), Some(1));
}

#[test]
fn clicks_during_resolution_are_ignored() {
    let renderer = Arc::new(ScriptedRenderer::new(8).gated());
    let mut viewer = viewer_for(&renderer, no_preload());

    let FlipStart::Resolving(ticket) = viewer.next() else {
        panic!("expected a resolving flip");
    };
    assert!(renderer.wait_started(WAIT).is_some());

    for _ in 0..5 {
        assert_eq!(viewer.next(), FlipStart::Ignored);
        assert_eq!(viewer.prev(), FlipStart::Ignored);
    }
    assert!(!viewer.can_go_next());

    renderer.release();
    let Some(FlipEvent::Mounted(key)) = viewer.wait_resolution(WAIT) else {
        panic!("expected the overlay to mount");
    };
    assert_eq!(key.ticket, ticket);
    while viewer.on_animation_frame().is_none() {}
    assert_eq!(viewer.on_transition_settled(), Some(1));
    assert!(viewer.can_go_next());
}

#[test]
fn failed_page_keeps_spread_and_allows_retry() {
    let renderer = Arc::new(ScriptedRenderer::new(6).failing([3]));
    let mut viewer = viewer_for(&renderer, no_preload());

    assert!(matches!(viewer.next(), FlipStart::Resolving(_)));
    assert!(matches!(
        viewer.wait_resolution(WAIT),
        Some(FlipEvent::Failed { .. })
    ));
    assert_eq!(viewer.current_spread().index, 0);
    assert!(viewer.layers().flip.is_none());
    assert!(viewer.can_go_next());

    renderer.heal(3);
    assert!(matches!(viewer.next(), FlipStart::Resolving(_)));
    assert_eq!(complete_flip(&mut viewer), 1);
    // Pages that rendered the first time came from the cache
    assert_eq!(renderer.calls_for(2), 1);
    assert_eq!(renderer.calls_for(3), 2);
}

#[test]
fn mobile_mode_steps_page_by_page() {
    let renderer = Arc::new(ScriptedRenderer::new(3));
    let mut viewer = viewer_for(&renderer, no_preload());
    viewer.set_mobile(true);

    assert!(viewer.is_mobile());
    assert_eq!(viewer.current_label(), "Page 1 of 3");
    assert_eq!(viewer.render_visible(), Ok(1));
    let BaseLayer::Single(slot) = viewer.layers().base else {
        panic!("expected a single page");
    };
    assert!(slot.is_ready());

    assert_eq!(viewer.prev(), FlipStart::Ignored);
    assert_eq!(viewer.next(), FlipStart::MobilePage(2));
    assert_eq!(viewer.next(), FlipStart::MobilePage(3));
    assert_eq!(viewer.next(), FlipStart::Ignored);
    assert_eq!(viewer.mobile_page(), Some(3));
    assert_eq!(viewer.current_label(), "Page 3 of 3");
    assert!(viewer.layers().flip.is_none());

    viewer.set_mobile(false);
    assert_eq!(viewer.current_label(), "Cover (page 1 of 3)");
}

#[test]
fn opening_another_issue_mid_flip_drops_the_old_flip() {
    let first = Arc::new(ScriptedRenderer::new(6).gated());
    let second = Arc::new(ScriptedRenderer::new(9));
    let source = ScriptedSource::new()
        .with_document(doc("may.pdf"), first.clone(), 0.7)
        .with_document(doc("june.pdf"), second.clone(), 0.75);
    let mut viewer = Viewer::new(Arc::new(source), no_preload());

    viewer.open(&doc("may.pdf")).unwrap();
    assert!(matches!(viewer.next(), FlipStart::Resolving(_)));
    assert!(first.wait_started(WAIT).is_some());

    let session = viewer.open(&doc("june.pdf")).unwrap();
    first.release();

    assert_eq!(session.page_count, 9);
    assert_eq!(viewer.wait_resolution(Duration::from_millis(100)), None);
    std::thread::sleep(Duration::from_millis(50));
    assert!(viewer.poll().is_empty());
    assert!(viewer.layers().flip.is_none());
    assert_eq!(viewer.current_label(), "Cover (page 1 of 9)");
    assert!(viewer.cache().is_empty());

    assert!(matches!(viewer.next(), FlipStart::Resolving(_)));
    assert_eq!(complete_flip(&mut viewer), 1);
    assert_eq!(viewer.current_label(), "Pages 2–3 of 9");
}

#[test]
fn stage_clicks_and_swipes_turn_pages() {
    let renderer = Arc::new(ScriptedRenderer::new(4));
    let mut viewer = viewer_for(&renderer, no_preload());

    assert_eq!(viewer.on_stage_click(100.0, 1000.0), FlipStart::Ignored);
    assert_eq!(viewer.on_swipe(-120.0, 5.0), FlipStart::Ignored);
    assert!(matches!(
        viewer.on_stage_click(700.0, 1000.0),
        FlipStart::Resolving(_)
    ));
    assert_eq!(viewer.on_stage_click(700.0, 1000.0), FlipStart::Ignored);
    assert_eq!(complete_flip(&mut viewer), 1);

    viewer.set_mobile(true);
    assert_eq!(viewer.on_swipe(-30.0, 0.0), FlipStart::Ignored);
    assert_eq!(viewer.on_swipe(-60.0, -90.0), FlipStart::Ignored);
    assert_eq!(viewer.on_swipe(-60.0, 10.0), FlipStart::MobilePage(2));
    assert_eq!(viewer.on_swipe(75.0, 0.0), FlipStart::MobilePage(1));
    assert_eq!(viewer.on_swipe(75.0, 0.0), FlipStart::Ignored);
    assert_eq!(viewer.on_stage_click(900.0, 1000.0), FlipStart::MobilePage(2));
}

#[test]
fn missing_document_fails_the_viewer() {
    let renderer = Arc::new(ScriptedRenderer::new(4));
    let source = ScriptedSource::new().with_document(doc("issue.pdf"), renderer, 0.7);
    let mut viewer = Viewer::new(Arc::new(source), no_preload());

    assert!(viewer.open(&doc("missing.pdf")).is_err());
    assert!(matches!(viewer.status(), ViewerStatus::Failed(msg) if msg.contains("missing.pdf")));
    assert_eq!(viewer.current_label(), "—");
    assert_eq!(viewer.next(), FlipStart::Ignored);
    assert!(viewer.session().is_none());
}

#[test]
fn closing_resets_everything() {
    let renderer = Arc::new(ScriptedRenderer::new(4));
    let mut viewer = viewer_for(&renderer, no_preload());
    viewer.render_visible().unwrap();
    let epoch = viewer.epoch();

    viewer.close();

    assert_eq!(viewer.status(), &ViewerStatus::Idle);
    assert!(viewer.epoch() > epoch);
    assert!(viewer.cache().is_empty());
    assert_eq!(viewer.spread_count(), 0);
    assert!(matches!(viewer.layers().base, BaseLayer::Empty));
}

#[test]
fn preload_warms_the_cache_for_flips() {
    let renderer = Arc::new(ScriptedRenderer::new(7));
    let config = ViewerConfig {
        preload: Some(PreloadConfig {
            batch_size: 2,
            batch_delay: Duration::from_millis(1),
        }),
        ..ViewerConfig::default()
    };
    let mut viewer = viewer_for(&renderer, config);

    let report = viewer.wait_for_preload().expect("preload report");
    assert_eq!(report.batches, 4);
    assert_eq!(report.rendered, 7);
    assert_eq!(viewer.cache().len(), 7);

    while viewer.can_go_next() {
        viewer.next();
        complete_flip(&mut viewer);
    }
    assert_eq!(renderer.call_count(), 7);
}

#[test]
fn page_height_keeps_proportions() {
    let renderer = Arc::new(ScriptedRenderer::new(2));
    let viewer = viewer_for(&renderer, no_preload());
    assert_eq!(viewer.page_height_for(700), 1000);
}
