//! Prediction endpoints - HTML form upload and JSON API
//!
//! Both accept a multipart upload in the `image` field (the web form) or the
//! `file` field (the mobile client). The forward pass runs on the blocking
//! pool so the async workers stay free while the model lock is held.

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use leaf_classifier::inference::ClassProbability;
use leaf_classifier::{Classification, ClassifierError};

use super::page::{render, Outcome};
use crate::state::SharedState;

/// Multipart field names accepted for the image
pub const UPLOAD_FIELDS: [&str; 2] = ["image", "file"];

/// An uploaded file pulled out of the multipart body
pub struct Upload {
    pub file_name: Option<String>,
    pub bytes: Bytes,
}

/// JSON body of a successful prediction
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predicted_class: String,
    pub confidence: f32,
    pub uncertain: bool,
    pub probabilities: Vec<ClassProbability>,
    pub inference_time_ms: f64,
}

/// JSON body of a failed prediction
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Status code for a classification failure: bad input vs. server fault
pub fn error_status(err: &ClassifierError) -> StatusCode {
    if err.is_decode() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Keep only the last path component and a conservative character set,
/// then prefix a random id so uploads never overwrite each other
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(&['/', '\\'][..]).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .take(100)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let cleaned = if cleaned.is_empty() { "upload" } else { cleaned };

    format!("{}_{}", &Uuid::new_v4().simple().to_string()[..8], cleaned)
}

/// First non-empty upload in one of the accepted fields
pub async fn read_upload(multipart: &mut Multipart) -> Result<Option<Upload>, (StatusCode, String)> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Malformed multipart body: {}", e);
        (StatusCode::BAD_REQUEST, format!("malformed upload: {}", e))
    })? {
        let accepted = field
            .name()
            .map(|name| UPLOAD_FIELDS.contains(&name))
            .unwrap_or(false);
        if !accepted {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| {
            warn!("Failed to read upload: {}", e);
            (StatusCode::BAD_REQUEST, format!("failed to read upload: {}", e))
        })?;

        if bytes.is_empty() {
            continue;
        }
        return Ok(Some(Upload { file_name, bytes }));
    }
    Ok(None)
}

/// Classify on the blocking pool
pub async fn run_classifier(state: &SharedState, bytes: Bytes) -> Result<Classification, ClassifierError> {
    let classifier = state.classifier.clone();
    let result = tokio::task::spawn_blocking(move || classifier.classify(&bytes))
        .await
        .map_err(|e| ClassifierError::Inference(format!("inference task failed: {}", e)))?;

    match &result {
        Ok(c) => info!(
            "Predicted {} ({:.2}%) in {:.1} ms",
            c.label,
            c.confidence_percent(),
            c.inference_time_ms
        ),
        Err(e) if e.is_decode() => warn!("Rejected upload: {}", e),
        Err(e) => error!("Classification failed: {}", e),
    }
    result
}

/// POST /predict - Form upload, re-renders the page with the result
pub async fn predict_page(State(state): State<SharedState>, mut multipart: Multipart) -> Response {
    let upload = match read_upload(&mut multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => return Redirect::to("/").into_response(),
        Err((status, message)) => {
            return (status, Html(render(&state, Outcome::Error(&message)))).into_response()
        }
    };

    let file_name = sanitize_file_name(upload.file_name.as_deref().unwrap_or_default());
    let path = state.config.upload_dir.join(&file_name);
    if let Err(e) = tokio::fs::write(&path, &upload.bytes).await {
        error!("Failed to save upload to {:?}: {}", path, e);
        let message = "Could not store the uploaded file.";
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(render(&state, Outcome::Error(message))),
        )
            .into_response();
    }

    match run_classifier(&state, upload.bytes).await {
        Ok(classification) => {
            let uncertain = !classification.is_confident(state.config.low_confidence_threshold);
            Html(render(
                &state,
                Outcome::Result {
                    file_name: &file_name,
                    classification: &classification,
                    uncertain,
                },
            ))
            .into_response()
        }
        Err(e) => {
            let message = if e.is_decode() {
                "The uploaded file is not a readable image.".to_string()
            } else {
                "Prediction failed, please try again.".to_string()
            };
            (error_status(&e), Html(render(&state, Outcome::Error(&message)))).into_response()
        }
    }
}

/// POST /api/predict - JSON prediction for programmatic clients
pub async fn predict_api(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>, (StatusCode, Json<ErrorResponse>)> {
    let upload = read_upload(&mut multipart)
        .await
        .map_err(|(status, error)| (status, Json(ErrorResponse { error })))?
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "no image in fields 'image' or 'file'".to_string(),
                }),
            )
        })?;

    let classification = run_classifier(&state, upload.bytes).await.map_err(|e| {
        (
            error_status(&e),
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    Ok(Json(PredictResponse {
        uncertain: !classification.is_confident(state.config.low_confidence_threshold),
        predicted_class: classification.label,
        confidence: classification.confidence,
        probabilities: classification.probabilities,
        inference_time_ms: classification.inference_time_ms,
    }))
}
