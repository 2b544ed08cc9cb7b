//! Router behaviour through `tower::ServiceExt::oneshot`.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use relay_config::{PipelineConfig, ServerConfig};
use relay_jobs::{Job, JobPayload, JobResult, QueueConfig, QueueManager, TaskHandler};
use relay_rest::{create_router, AppState};
use relay_service::{
    AudioJobPayload, MessageId, MessagingError, MessagingService, ACKNOWLEDGEMENT_MESSAGE,
    BUSY_MESSAGE,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

const QUEUE: &str = "audio_processing";
const SENDER: &str = "whatsapp:+6512345678";

#[derive(Default)]
struct RecordingMessaging {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl MessagingService for RecordingMessaging {
    async fn send(&self, to: &str, body: &str) -> Result<MessageId, MessagingError> {
        self.sent.lock().push((to.to_string(), body.to_string()));
        Ok(MessageId("SM1".into()))
    }
}

#[derive(Default)]
struct RecordingHandler {
    payloads: Mutex<Vec<AudioJobPayload>>,
}

#[async_trait]
impl TaskHandler for RecordingHandler {
    async fn handle(&self, job: &Job) -> JobResult<()> {
        let payload: AudioJobPayload = job.payload()?;
        self.payloads.lock().push(payload);
        Ok(())
    }
}

struct TestApp {
    router: Router,
    manager: Arc<QueueManager>,
    messaging: Arc<RecordingMessaging>,
    handler: Arc<RecordingHandler>,
}

fn app(create_queue: bool, send_acknowledgement: bool) -> TestApp {
    let manager = Arc::new(QueueManager::new());
    let messaging = Arc::new(RecordingMessaging::default());
    let handler = Arc::new(RecordingHandler::default());
    manager.register_handler(AudioJobPayload::TASK_TYPE, handler.clone());
    if create_queue {
        manager.create_queue(QueueConfig::new(QUEUE)).unwrap();
    }

    let pipeline = PipelineConfig {
        target_language: "Chinese".to_string(),
        send_acknowledgement,
        ..PipelineConfig::default()
    };
    let state = AppState::new(manager.clone(), messaging.clone(), QUEUE, pipeline);

    TestApp {
        router: create_router(state, &ServerConfig::default()),
        manager,
        messaging,
        handler,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read(response).await
}

async fn post_form(router: &Router, uri: &str, form: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read(response).await
}

async fn read(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn voice_form() -> String {
    "From=whatsapp%3A%2B6512345678&NumMedia=1\
     &MediaUrl0=https%3A%2F%2Fapi.twilio.com%2Fmedia%2FME1\
     &MediaContentType0=audio%2Fogg"
        .to_string()
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = app(true, false);

    let (status, body) = get(&app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = get(&app.router, "/live").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_ready_requires_queue() {
    let app = app(false, false);

    let (status, body) = get(&app.router, "/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "not_ready");

    app.manager.create_queue(QueueConfig::new(QUEUE)).unwrap();
    let (status, _) = get(&app.router, "/ready").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_queues_voice_message() {
    let app = app(true, false);

    let (status, body) = post_form(&app.router, "/webhook", &voice_form()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let handler = app.handler.clone();
    wait_for(|| !handler.payloads.lock().is_empty()).await;
    let payload = app.handler.payloads.lock()[0].clone();
    assert_eq!(payload.media_url, "https://api.twilio.com/media/ME1");
    assert_eq!(payload.sender_address, SENDER);
    assert_eq!(payload.target_language, "Chinese");
    assert!(app.messaging.sent.lock().is_empty());
}

#[tokio::test]
async fn test_webhook_ignores_non_audio() {
    let app = app(true, false);

    let form = "From=whatsapp%3A%2B6512345678&NumMedia=1\
                &MediaUrl0=https%3A%2F%2Fcdn%2Fimg.jpg&MediaContentType0=image%2Fjpeg";
    let (status, body) = post_form(&app.router, "/webhook", form).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = post_form(&app.router, "/webhook", "From=whatsapp%3A%2B1&Body=hi&NumMedia=0").await;
    assert_eq!(status, StatusCode::OK);

    let stats = app.manager.queue_stats(QUEUE).unwrap();
    assert_eq!(stats.pending + stats.running, 0);
    assert_eq!(stats.succeeded + stats.failed, 0);
}

#[tokio::test]
async fn test_webhook_sends_acknowledgement_when_enabled() {
    let app = app(true, true);

    post_form(&app.router, "/webhook", &voice_form()).await;

    let messaging = app.messaging.clone();
    wait_for(|| !messaging.sent.lock().is_empty()).await;
    assert_eq!(
        app.messaging.sent.lock()[0],
        (SENDER.to_string(), ACKNOWLEDGEMENT_MESSAGE.to_string())
    );
}

#[tokio::test]
async fn test_webhook_reports_busy_but_still_acknowledges() {
    let app = app(true, false);
    app.manager.shutdown(false, Duration::ZERO).await;

    let (status, body) = post_form(&app.router, "/webhook", &voice_form()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let messaging = app.messaging.clone();
    wait_for(|| !messaging.sent.lock().is_empty()).await;
    assert_eq!(app.messaging.sent.lock()[0].1, BUSY_MESSAGE);
    assert!(app.handler.payloads.lock().is_empty());
}

#[tokio::test]
async fn test_webhook_without_queue_still_returns_ok() {
    let app = app(false, false);

    let (status, body) = post_form(&app.router, "/webhook", &voice_form()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(app.messaging.sent.lock().is_empty());
}

#[tokio::test]
async fn test_job_lookup() {
    let app = app(true, false);
    let payload = AudioJobPayload {
        media_url: "https://cdn/x.ogg".into(),
        sender_address: SENDER.into(),
        target_language: "English".into(),
    };
    let id = app.manager.enqueue(QUEUE, &payload, None).unwrap();

    let manager = app.manager.clone();
    let lookup = id.clone();
    wait_for(|| manager.job(&lookup).is_some_and(|info| info.status.is_terminal())).await;

    let (status, body) = get(&app.router, &format!("/api/v1/jobs/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "succeeded");
    assert_eq!(body["data"]["task_type"], "process_audio");

    let (status, body) = get(&app.router, "/api/v1/jobs/process_audio-missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_queue_stats_and_circuit_reset() {
    let app = app(true, false);

    let (status, body) = get(&app.router, &format!("/api/v1/queues/{}/stats", QUEUE)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["queue"], QUEUE);
    assert_eq!(body["data"]["circuit_state"], "closed");

    let (status, _) = get(&app.router, "/api/v1/queues/unknown/stats").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = post_form(
        &app.router,
        &format!("/api/v1/queues/{}/circuit/reset", QUEUE),
        "",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reset"], true);
}
