//! `POST /v1/audio/speech`

use axum::{
    body::{Body, Bytes},
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;
use voxrelay_core::{synthesize_buffered, SpeechRequest, StreamSession, SynthesisRequest};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn create_speech(
    State(state): State<AppState>,
    payload: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let request = payload.validate()?;
    let voice = state.voices.resolve(request.voice());

    info!(
        "Speech request: {} chars, voice {}, format {}, stream {}",
        request.text().chars().count(),
        voice,
        request.format(),
        request.is_streaming()
    );

    if request.is_streaming() {
        stream_speech(&state, &request, voice).await
    } else {
        buffered_speech(&state, &request, voice).await
    }
}

async fn stream_speech(
    state: &AppState,
    request: &SynthesisRequest,
    voice: &str,
) -> Result<Response, ApiError> {
    let session = StreamSession::start(
        &state.provider,
        &state.transcoder,
        request.text(),
        voice,
        request.format(),
    )
    .await?;

    let content_type = session.content_type();
    let body = Body::from_stream(session.into_body());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::TRANSFER_ENCODING, "chunked")
        .body(body)
        .map_err(|e| ApiError::server_error(e.to_string()))
}

async fn buffered_speech(
    state: &AppState,
    request: &SynthesisRequest,
    voice: &str,
) -> Result<Response, ApiError> {
    let audio: Bytes = synthesize_buffered(
        &state.provider,
        &state.transcoder,
        request.text(),
        voice,
        request.format(),
    )
    .await?;

    info!("Synthesized {} bytes of {}", audio.len(), request.format());

    Ok((
        [
            (header::CONTENT_TYPE, request.format().content_type().to_string()),
            (header::CONTENT_LENGTH, audio.len().to_string()),
        ],
        audio,
    )
        .into_response())
}
