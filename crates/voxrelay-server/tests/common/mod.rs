#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use base64::Engine;
use serde_json::{json, Value};
use tower::ServiceExt;
use voxrelay_core::ProxyConfig;
use voxrelay_server::{create_router, AppState};
use wiremock::MockServer;

pub const TEST_MODEL: &str = "test-model";

pub fn test_config(server: &MockServer) -> ProxyConfig {
    let mut config = ProxyConfig::for_endpoint(server.uri());
    config.gemini_model = TEST_MODEL.to_string();
    config
}

pub fn test_app(server: &MockServer) -> Router {
    create_router(AppState::new(test_config(server)))
}

pub fn ffmpeg_has_encoder(name: &str) -> bool {
    std::process::Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
        .map(|o| o.status.success() && String::from_utf8_lossy(&o.stdout).contains(name))
        .unwrap_or(false)
}

/// Deterministic 16-bit mono PCM
pub fn tone(samples: usize, offset: usize) -> Vec<u8> {
    (0..samples)
        .flat_map(|i| {
            let t = (i + offset) as f32 / 24_000.0;
            let v = ((2.0 * std::f32::consts::PI * 330.0 * t).sin() * 6000.0) as i16;
            v.to_le_bytes()
        })
        .collect()
}

pub fn inline_audio(pcm: &[u8]) -> Value {
    json!({
        "candidates": [{
            "content": {
                "parts": [{
                    "inlineData": {
                        "mimeType": "audio/L16;codec=pcm;rate=24000",
                        "data": base64::engine::general_purpose::STANDARD.encode(pcm)
                    }
                }]
            }
        }]
    })
}

pub fn sse_body(frames: &[Vec<u8>]) -> String {
    frames
        .iter()
        .map(|pcm| format!("data: {}\r\n\r\n", inline_audio(pcm)))
        .collect()
}

pub async fn post_speech(app: Router, body: Value) -> Response {
    post_raw(app, body.to_string()).await
}

pub async fn post_raw(app: Router, body: String) -> Response {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri("/v1/audio/speech")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn assert_error(response: Response, status: StatusCode, kind: &str) -> Value {
    assert_eq!(response.status(), status);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], kind);
    assert!(body["error"]["message"].is_string());
    body
}
