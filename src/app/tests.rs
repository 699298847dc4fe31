use super::*;
use crate::api::{Method, MockReply, MockTransport};
use crate::config::BoothConfig;
use crate::events::BoothEvent;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

fn test_config(store: &TempDir) -> BoothConfig {
    let mut config = BoothConfig::default();
    config.gallery.event_code = "EV1".to_string();
    config.gallery.autoplay = false;
    config.pipeline.event_code = "EV1".to_string();
    config.pipeline.station_code = "ST1".to_string();
    config.pipeline.print_enabled = false;
    config.session.station_code = "ST1".to_string();
    config.session.store_dir = store.path().to_string_lossy().into_owned();
    config
}

fn pipeline_backend() -> Arc<MockTransport> {
    let transport = Arc::new(MockTransport::new());
    transport.on(
        Method::Post,
        "/gallery/generate/qrcode",
        MockReply::success(json!({ "qrcode": "AB12" })),
    );
    transport.on(
        Method::Post,
        "/gallery/upload",
        MockReply::success(json!({ "url": "https://cdn.example/AB12.jpg" })),
    );
    transport
}

fn app(config: BoothConfig, mode: RunMode, transport: &Arc<MockTransport>) -> BoothApp {
    BoothApp::with_transport(config, mode, transport.clone())
}

#[test]
fn test_mode_components() {
    assert_eq!(
        RunMode::Gallery { tiles: false }.components(),
        &["gallery", "keyboard"]
    );
    assert_eq!(RunMode::Capture.components(), &["pipeline"]);
    assert_eq!(RunMode::Kiosk.components(), &["kiosk", "pipeline"]);
}

#[tokio::test]
async fn test_gallery_requires_event_code() {
    let store = TempDir::new().unwrap();
    let mut config = test_config(&store);
    config.gallery.event_code = "  ".to_string();
    let transport = Arc::new(MockTransport::new());
    let mut app = app(config, RunMode::Gallery { tiles: false }, &transport);

    assert!(app.initialize().is_err());
    assert!(app.gallery().is_none());
}

#[tokio::test]
async fn test_initialize_tracks_mode_components() {
    let store = TempDir::new().unwrap();
    let transport = Arc::new(MockTransport::new());

    let mut gallery = app(test_config(&store), RunMode::Gallery { tiles: true }, &transport);
    gallery.initialize().unwrap();
    let states = gallery.get_all_component_states();
    assert_eq!(states.len(), 1);
    assert_eq!(states.get("gallery"), Some(&ComponentState::Stopped));
    assert!(gallery.gallery().is_some());
    assert!(gallery.pipeline().is_none());

    let mut kiosk = app(test_config(&store), RunMode::Kiosk, &transport);
    kiosk.initialize().unwrap();
    assert_eq!(kiosk.get_all_component_states().len(), 2);
    assert!(kiosk.kiosk().is_some());
    assert!(kiosk.pipeline().is_some());
}

#[tokio::test]
async fn test_tile_gallery_uses_stored_viewer_poll() {
    let store = TempDir::new().unwrap();
    let config = test_config(&store);
    let mut viewer = config.viewer;
    viewer.poll_ms = 4321;
    crate::settings::SettingsStore::file(store.path(), config.viewer)
        .save(&viewer)
        .unwrap();

    let transport = Arc::new(MockTransport::new());
    let mut app = app(config, RunMode::Gallery { tiles: true }, &transport);
    app.initialize().unwrap();

    assert_eq!(
        app.gallery().unwrap().poll_interval(),
        Duration::from_millis(4321)
    );
}

#[tokio::test]
async fn test_only_first_shutdown_request_counts() {
    let store = TempDir::new().unwrap();
    let transport = Arc::new(MockTransport::new());
    let app = app(test_config(&store), RunMode::Capture, &transport);

    assert!(app.request_shutdown(ShutdownReason::UserRequest));
    assert!(!app.request_shutdown(ShutdownReason::Completed));
}

#[tokio::test(start_paused = true)]
async fn test_capture_mode_completes_and_exits_cleanly() {
    let store = TempDir::new().unwrap();
    let transport = pipeline_backend();
    let mut app = app(test_config(&store), RunMode::Capture, &transport);
    app.initialize().unwrap();
    app.start().await.unwrap();

    let exit_code = timeout(Duration::from_secs(30), app.run())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exit_code, 0);
    let routes = transport.routes_called();
    assert_eq!(
        routes.iter().filter(|r| *r == "POST /gallery/upload").count(),
        1
    );
    assert_eq!(transport.call_count("/printer"), 0);
    assert_eq!(
        app.get_component_state("pipeline"),
        Some(ComponentState::Stopped)
    );
    assert!(!app.pipeline().unwrap().is_open());
}

#[tokio::test(start_paused = true)]
async fn test_capture_mode_failure_exits_with_error_code() {
    let store = TempDir::new().unwrap();
    let transport = pipeline_backend();
    transport.on(
        Method::Post,
        "/gallery/generate/qrcode",
        MockReply::error("Code pool exhausted"),
    );
    let mut app = app(test_config(&store), RunMode::Capture, &transport);
    app.initialize().unwrap();
    app.start().await.unwrap();

    let exit_code = timeout(Duration::from_secs(30), app.run())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exit_code, 1);
    assert_eq!(transport.call_count("/gallery/upload"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_gallery_runs_until_shutdown_requested() {
    let store = TempDir::new().unwrap();
    let transport = Arc::new(MockTransport::new());
    transport.on(
        Method::Get,
        "/gallery-by-event/EV1",
        MockReply::success(json!([
            { "id": 1, "qrcode": "A", "file_name": "Image_1.jpg" },
            { "id": 2, "qrcode": "B", "file_name": "Image_2.jpg" }
        ])),
    );
    let mut app = app(test_config(&store), RunMode::Gallery { tiles: false }, &transport);
    app.initialize().unwrap();
    app.start().await.unwrap();

    sleep(Duration::from_millis(10)).await;
    let report = app.status_report();
    assert_eq!(report.gallery_items, Some(2));
    assert_eq!(report.components.get("gallery").map(String::as_str), Some("Running"));

    let bus = app.event_bus();
    tokio::spawn(async move {
        sleep(Duration::from_millis(500)).await;
        let _ = bus.publish(BoothEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: "test".to_string(),
        });
    });

    let exit_code = timeout(Duration::from_secs(30), app.run())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exit_code, 0);
    assert_eq!(
        app.get_component_state("gallery"),
        Some(ComponentState::Stopped)
    );

    // Polling stops with the app
    let polls = transport.call_count("/gallery-by-event");
    sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.call_count("/gallery-by-event"), polls);
}

#[tokio::test(start_paused = true)]
async fn test_kiosk_expired_session_ends_without_backend_end() {
    let store = TempDir::new().unwrap();
    let transport = pipeline_backend();
    transport.on(
        Method::Post,
        "/selfie/session/create-session",
        MockReply::success(json!({ "uuid": "s-7" })),
    );
    transport.on(
        Method::Get,
        "/selfie/session/read-by-uuid/s-7",
        MockReply::success(json!({ "remaining_seconds": 0 })),
    );
    let mut app = app(test_config(&store), RunMode::Kiosk, &transport);
    let mut rx = app.event_bus().subscribe();
    app.initialize().unwrap();
    app.start().await.unwrap();

    let exit_code = timeout(Duration::from_secs(30), app.run())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exit_code, 0);
    let mut expired = false;
    while let Ok(event) = rx.try_recv() {
        if let BoothEvent::SessionExpired { session_uuid, .. } = event {
            assert_eq!(session_uuid, "s-7");
            expired = true;
        }
    }
    assert!(expired);
    assert!(app.kiosk().unwrap().phase().is_none());
    assert_eq!(transport.call_count("/selfie/session/end"), 0);
    assert_eq!(transport.call_count("/gallery/generate"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_kiosk_expiry_mid_run_abandons_the_pipeline() {
    let store = TempDir::new().unwrap();
    let mut config = test_config(&store);
    config.pipeline.print_enabled = true;
    let transport = pipeline_backend();
    transport.on(
        Method::Post,
        "/selfie/session/create-session",
        MockReply::success(json!({ "uuid": "s-9" })),
    );
    transport.once(
        Method::Get,
        "/selfie/session/read-by-uuid/s-9",
        MockReply::success(json!({ "remaining_seconds": 100 })),
    );
    transport.on(
        Method::Get,
        "/selfie/session/read-by-uuid/s-9",
        MockReply::success(json!({ "remaining_seconds": 0 })),
    );
    transport.on(
        Method::Get,
        "/capture/check-capture-image",
        MockReply::success(json!({ "file_name": "IMG_4.jpg" })),
    );
    transport.delay(Method::Post, "/render/image", Duration::from_secs(20));

    let mut app = app(config, RunMode::Kiosk, &transport);
    let mut rx = app.event_bus().subscribe();
    app.initialize().unwrap();
    app.start().await.unwrap();

    let exit_code = timeout(Duration::from_secs(60), app.run())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exit_code, 0);
    let mut found = false;
    let mut expired = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            BoothEvent::MediaFound { .. } => found = true,
            BoothEvent::SessionExpired { session_uuid, .. } => {
                assert_eq!(session_uuid, "s-9");
                expired = true;
            }
            _ => {}
        }
    }
    assert!(found && expired);

    // Nothing after the render that was in flight at expiry
    sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.call_count("/render/image"), 1);
    assert_eq!(transport.call_count("/render/draw-text"), 0);
    assert_eq!(transport.call_count("/gallery/upload"), 0);
    assert_eq!(transport.call_count("/printer"), 0);
    assert_eq!(transport.call_count("/selfie/session/end"), 0);
    assert!(!app.pipeline().unwrap().is_open());
}

#[tokio::test(start_paused = true)]
async fn test_capture_links_promotion_code_to_searched_recipient() {
    let store = TempDir::new().unwrap();
    let mut config = test_config(&store);
    config.pipeline.promo_enabled = true;
    let transport = pipeline_backend();
    transport.on(
        Method::Get,
        "/person/search-by-phone/0812345",
        MockReply::success(json!([
            { "id": 78, "name": "Kim", "phone": "08123456" },
            { "id": 77, "name": "Dana", "phone": "0812345" }
        ])),
    );

    let mut app = app(config, RunMode::Capture, &transport);
    app.set_recipient_phone(Some("0812 345".to_string()));
    app.initialize().unwrap();
    app.start().await.unwrap();

    let exit_code = timeout(Duration::from_secs(30), app.run())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exit_code, 0);
    let routes = transport.routes_called();
    let searched = routes
        .iter()
        .position(|r| r == "GET /person/search-by-phone/0812345")
        .unwrap();
    let generated = routes
        .iter()
        .position(|r| r == "POST /gallery/generate/qrcode")
        .unwrap();
    assert!(searched < generated);

    let links = transport.calls_to("/promotion-code/link-person");
    assert_eq!(links.len(), 1);
    let body = links[0].body.clone().unwrap();
    assert_eq!(body["code"], "AB12");
    assert_eq!(body["person_id"], "77");
}

#[tokio::test(start_paused = true)]
async fn test_recipient_ignored_when_promotions_disabled() {
    let store = TempDir::new().unwrap();
    let transport = pipeline_backend();
    let mut app = app(test_config(&store), RunMode::Capture, &transport);
    app.set_recipient_phone(Some("0812345".to_string()));
    app.initialize().unwrap();
    app.start().await.unwrap();

    let exit_code = timeout(Duration::from_secs(30), app.run())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exit_code, 0);
    assert_eq!(transport.call_count("/person"), 0);
    assert_eq!(transport.call_count("/promotion-code"), 0);
}
