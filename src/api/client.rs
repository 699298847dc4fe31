use super::envelope::{ApiRequest, Envelope};
use super::transport::{cancellable, Transport};
use crate::error::{BoothError, Result};
use crate::gallery::MediaRecord;
use crate::pipeline::Recipient;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Typed calls against the booth backend.
///
/// Every call takes the caller's cancellation token; cancelling it aborts the
/// request in flight.
#[derive(Clone)]
pub struct BoothApi {
    transport: Arc<dyn Transport>,
}

impl BoothApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn call(&self, request: ApiRequest, token: &CancellationToken) -> Result<Envelope> {
        debug!("API call {}", request.route());
        cancellable(token, self.transport.send(request)).await
    }

    // Gallery

    pub async fn gallery_by_event(
        &self,
        event_code: &str,
        token: &CancellationToken,
    ) -> Result<Vec<MediaRecord>> {
        let envelope = self
            .call(
                ApiRequest::get(format!("/gallery-by-event/{}", event_code)),
                token,
            )
            .await?;
        Ok(envelope.data_as::<Vec<MediaRecord>>()?.unwrap_or_default())
    }

    // Capture device

    /// File waiting on the capture device, if any
    pub async fn check_capture_image(&self, token: &CancellationToken) -> Result<Option<String>> {
        let envelope = self
            .call(ApiRequest::get("/capture/check-capture-image"), token)
            .await?;
        Ok(envelope.string_field(&["file_name", "fileName", "file"]))
    }

    pub async fn move_capture_image(&self, file: &str, token: &CancellationToken) -> Result<()> {
        self.call(
            ApiRequest::get("/capture/move-capture-image").with_query("file_name", file),
            token,
        )
        .await?;
        Ok(())
    }

    pub async fn clear_all_capture(&self, token: &CancellationToken) -> Result<()> {
        self.call(ApiRequest::get("/capture/clear-all-capture"), token)
            .await?;
        Ok(())
    }

    // Processing pipeline

    pub async fn clear_path(&self, path: &str, token: &CancellationToken) -> Result<()> {
        self.call(
            ApiRequest::post("/manage/clear-path", json!({ "path": path })),
            token,
        )
        .await?;
        Ok(())
    }

    pub async fn make_input(&self, token: &CancellationToken) -> Result<()> {
        self.call(ApiRequest::get("/capture/make-input"), token)
            .await?;
        Ok(())
    }

    /// Returns the generated short code
    pub async fn generate_qrcode(
        &self,
        event_code: &str,
        station_code: &str,
        token: &CancellationToken,
    ) -> Result<String> {
        let envelope = self
            .call(
                ApiRequest::post(
                    "/gallery/generate/qrcode",
                    json!({ "event_code": event_code, "station_code": station_code }),
                ),
                token,
            )
            .await?;
        envelope
            .string_field(&["qrcode", "code"])
            .ok_or_else(|| BoothError::api("invalid", Some("No code was generated".to_string())))
    }

    pub async fn render(
        &self,
        template: &str,
        qrcode: &str,
        token: &CancellationToken,
    ) -> Result<()> {
        self.call(
            ApiRequest::post(
                "/render/image",
                json!({ "template": template, "qrcode": qrcode }),
            ),
            token,
        )
        .await?;
        Ok(())
    }

    pub async fn draw_text(&self, qrcode: &str, text: &str, token: &CancellationToken) -> Result<()> {
        self.call(
            ApiRequest::post("/render/draw-text", json!({ "qrcode": qrcode, "text": text })),
            token,
        )
        .await?;
        Ok(())
    }

    pub async fn pre_upload(
        &self,
        qrcode: &str,
        event_code: &str,
        token: &CancellationToken,
    ) -> Result<()> {
        self.call(
            ApiRequest::post(
                "/gallery/upload/pre-upload",
                json!({ "qrcode": qrcode, "event_code": event_code }),
            ),
            token,
        )
        .await?;
        Ok(())
    }

    /// Returns the public URL of the uploaded asset when the backend reports one
    pub async fn upload(
        &self,
        qrcode: &str,
        event_code: &str,
        station_code: &str,
        token: &CancellationToken,
    ) -> Result<Option<String>> {
        let envelope = self
            .call(
                ApiRequest::post(
                    "/gallery/upload",
                    json!({
                        "qrcode": qrcode,
                        "event_code": event_code,
                        "station_code": station_code,
                    }),
                ),
                token,
            )
            .await?;
        Ok(envelope.string_field(&["url", "file_url"]))
    }

    pub async fn pre_print(&self, qrcode: &str, token: &CancellationToken) -> Result<()> {
        self.call(
            ApiRequest::post("/printer/pre-print", json!({ "qrcode": qrcode })),
            token,
        )
        .await?;
        Ok(())
    }

    pub async fn print(
        &self,
        printer_name: &str,
        copies: u32,
        token: &CancellationToken,
    ) -> Result<()> {
        self.call(
            ApiRequest::post(
                "/printer/print/windows",
                json!({ "printer_name": printer_name, "copies": copies }),
            ),
            token,
        )
        .await?;
        Ok(())
    }

    // Kiosk sessions

    pub async fn read_session_remaining(
        &self,
        session_uuid: &str,
        token: &CancellationToken,
    ) -> Result<i64> {
        let envelope = self
            .call(
                ApiRequest::get(format!("/selfie/session/read-by-uuid/{}", session_uuid)),
                token,
            )
            .await?;

        match envelope.field("remaining_seconds") {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.floor() as i64))
                .ok_or_else(unreadable_session),
            Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| unreadable_session()),
            _ => Err(unreadable_session()),
        }
    }

    /// Returns the new session uuid
    pub async fn create_session(
        &self,
        station_code: &str,
        token: &CancellationToken,
    ) -> Result<String> {
        let envelope = self
            .call(
                ApiRequest::post(
                    "/selfie/session/create-session",
                    json!({ "station_code": station_code }),
                ),
                token,
            )
            .await?;
        envelope
            .string_field(&["uuid", "session_uuid"])
            .ok_or_else(|| BoothError::api("invalid", Some("No session was created".to_string())))
    }

    pub async fn begin_session(&self, session_uuid: &str, token: &CancellationToken) -> Result<()> {
        self.call(
            ApiRequest::post("/selfie/session/begin", json!({ "uuid": session_uuid })),
            token,
        )
        .await?;
        Ok(())
    }

    pub async fn end_session(&self, session_uuid: &str, token: &CancellationToken) -> Result<()> {
        self.call(
            ApiRequest::post("/selfie/session/end", json!({ "uuid": session_uuid })),
            token,
        )
        .await?;
        Ok(())
    }

    // Promotion codes

    pub async fn search_person_by_phone(
        &self,
        phone: &str,
        token: &CancellationToken,
    ) -> Result<Vec<Recipient>> {
        let envelope = self
            .call(
                ApiRequest::get(format!("/person/search-by-phone/{}", phone)),
                token,
            )
            .await?;
        Ok(envelope.data_as::<Vec<Recipient>>()?.unwrap_or_default())
    }

    pub async fn link_promotion_code(
        &self,
        code: &str,
        person_id: &str,
        token: &CancellationToken,
    ) -> Result<()> {
        self.call(
            ApiRequest::post(
                "/promotion-code/link-person",
                json!({ "code": code, "person_id": person_id }),
            ),
            token,
        )
        .await?;
        Ok(())
    }
}

fn unreadable_session() -> BoothError {
    BoothError::api(
        "invalid",
        Some("Session time remaining could not be read".to_string()),
    )
}
