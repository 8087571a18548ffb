use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct PredictRequest {
    #[serde(default)]
    words: Option<String>,
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    result: String,
    confidence: f64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub(crate) async fn predict_body(
    State(state): State<AppState>,
    Json(payload): Json<PredictRequest>,
) -> Response {
    score(&state, payload.words.as_deref())
}

pub(crate) async fn predict_path(State(state): State<AppState>, Path(words): Path<String>) -> Response {
    score(&state, Some(&words))
}

fn score(state: &AppState, words: Option<&str>) -> Response {
    let metrics = state.telemetry().metrics();
    let Some(words) = words.filter(|words| !words.trim().is_empty()) else {
        metrics.prediction_failures_total.inc();
        let body = Json(ErrorResponse {
            error: "words must be a non-empty string".into(),
        });
        return (StatusCode::BAD_REQUEST, body).into_response();
    };

    let timer = metrics.prediction_duration.start_timer();
    let outcome = state.model().predict(words);
    timer.observe_duration();

    match outcome {
        Ok(prediction) => {
            metrics.predictions_total.inc();
            debug!(category = %prediction.category, confidence = prediction.confidence, "document scored");
            Json(PredictResponse {
                result: prediction.category,
                confidence: prediction.confidence,
            })
            .into_response()
        }
        Err(err) => {
            metrics.prediction_failures_total.inc();
            error!(error = %err, "prediction failed");
            let body = Json(ErrorResponse {
                error: err.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
        }
    }
}
