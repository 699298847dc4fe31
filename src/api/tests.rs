use super::*;
use crate::error::BoothError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn api_with(mock: &Arc<MockTransport>) -> BoothApi {
    BoothApi::new(Arc::clone(mock) as Arc<dyn Transport>)
}

#[test]
fn test_envelope_error_statuses() {
    let env = Envelope::from_value(json!({"status": "error", "message": "Printer jammed"})).unwrap();
    match env.into_result() {
        Err(BoothError::Api { message, .. }) => assert_eq!(message.as_deref(), Some("Printer jammed")),
        other => panic!("unexpected result: {:?}", other),
    }

    let env = Envelope::from_value(json!({"status": 500})).unwrap();
    assert!(env.is_error());

    let env = Envelope::from_value(json!({"status": "success", "data": []})).unwrap();
    assert!(!env.is_error());
}

#[test]
fn test_envelope_wraps_bare_array() {
    let env = Envelope::from_value(json!([1, 2, 3])).unwrap();
    assert_eq!(env.data, Some(json!([1, 2, 3])));
    assert!(env.status.is_none());
}

#[test]
fn test_envelope_field_lookup_order() {
    let env = Envelope::from_value(json!({
        "status": "success",
        "remaining_seconds": 5,
        "data": {"remaining_seconds": 42}
    }))
    .unwrap();
    assert_eq!(env.field("remaining_seconds"), Some(&json!(42)));

    let env = Envelope::from_value(json!({"remaining_seconds": 7})).unwrap();
    assert_eq!(env.field("remaining_seconds"), Some(&json!(7)));
}

#[tokio::test]
async fn test_gallery_by_event_parses_records() {
    let mock = Arc::new(MockTransport::new());
    mock.on(
        Method::Get,
        "/gallery-by-event/EV1",
        MockReply::success(json!([
            {
                "id": 11,
                "qrcode": "Q1",
                "file_name": "RenderImage1.jpg",
                "event_code": "EV1",
                "updated_at": "2024-05-01T10:00:00Z"
            },
            {
                "id": "12",
                "qrcode": "Q1",
                "file_name": "qrcode.jpg",
                "event_code": "EV1",
                "updated_at": "2024-05-01 10:00:05"
            }
        ])),
    );

    let records = api_with(&mock)
        .gallery_by_event("EV1", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, "11");
    assert_eq!(records[1].id, "12");
    assert_eq!(mock.routes_called(), vec!["GET /gallery-by-event/EV1"]);
}

#[tokio::test]
async fn test_gallery_without_data_is_empty() {
    let mock = Arc::new(MockTransport::new());
    let records = api_with(&mock)
        .gallery_by_event("EV1", &CancellationToken::new())
        .await
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_read_session_remaining_variants() {
    let mock = Arc::new(MockTransport::new());
    let api = api_with(&mock);
    let token = CancellationToken::new();
    let path = "/selfie/session/read-by-uuid/S1";

    mock.once(Method::Get, path, MockReply::Body(json!({"remaining_seconds": 30})));
    mock.once(Method::Get, path, MockReply::success(json!({"remaining_seconds": "12"})));
    mock.once(Method::Get, path, MockReply::success(json!({"remaining_seconds": 0.5})));
    mock.once(Method::Get, path, MockReply::success(json!({})));

    assert_eq!(api.read_session_remaining("S1", &token).await.unwrap(), 30);
    assert_eq!(api.read_session_remaining("S1", &token).await.unwrap(), 12);
    assert_eq!(api.read_session_remaining("S1", &token).await.unwrap(), 0);
    assert!(api.read_session_remaining("S1", &token).await.is_err());
}

#[tokio::test]
async fn test_generate_qrcode_requires_code() {
    let mock = Arc::new(MockTransport::new());
    let api = api_with(&mock);
    let token = CancellationToken::new();

    mock.once(
        Method::Post,
        "/gallery/generate/qrcode",
        MockReply::success(json!({"qrcode": "AB12"})),
    );
    assert_eq!(api.generate_qrcode("EV", "ST", &token).await.unwrap(), "AB12");

    mock.once(Method::Post, "/gallery/generate/qrcode", MockReply::ok());
    assert!(api.generate_qrcode("EV", "ST", &token).await.is_err());
}

#[tokio::test]
async fn test_move_capture_image_sends_query() {
    let mock = Arc::new(MockTransport::new());
    api_with(&mock)
        .move_capture_image("IMG_001.jpg", &CancellationToken::new())
        .await
        .unwrap();

    let calls = mock.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].query,
        vec![("file_name".to_string(), "IMG_001.jpg".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_aborts_call() {
    let mock = Arc::new(MockTransport::new());
    mock.delay(Method::Get, "/capture/make-input", Duration::from_secs(30));
    let api = api_with(&mock);
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let result = api.make_input(&token).await;
    assert!(matches!(result, Err(BoothError::Cancelled)));
}

#[tokio::test]
async fn test_unreachable_is_recoverable() {
    let mock = Arc::new(MockTransport::new());
    mock.on(
        Method::Get,
        "/capture/check-capture-image",
        MockReply::Unreachable("connection refused".to_string()),
    );

    let err = api_with(&mock)
        .check_capture_image(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_recoverable());
}
