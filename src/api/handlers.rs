use axum::{extract::rejection::JsonRejection, extract::State, Json};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::models::{GenerateRequest, GenerateResponse, HealthResponse};
use crate::app_state::AppState;
use crate::llm;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.model_name.clone(),
        profile: state.profile.to_string(),
    })
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(payload) = payload?;
    let params = state
        .profile
        .resolve(payload.temperature, payload.max_tokens, payload.seed)?;
    tracing::info!(
        "Generate request: {} chars, temperature {}, max_new_tokens {}",
        payload.input_text.len(),
        params.temperature,
        params.max_new_tokens
    );

    let result =
        tokio::task::spawn_blocking(move || run_generation(&state, &payload.input_text, &params))
            .await??;

    tracing::debug!("Generated: {}", result);
    Ok(Json(GenerateResponse { result }))
}

fn run_generation(
    state: &AppState,
    input_text: &str,
    params: &llm::inference::GenerationParams,
) -> Result<String, ApiError> {
    let templated = state.profile.uses_template();
    let prompt = if templated {
        llm::prompt::build_prompt(input_text)
    } else {
        input_text.to_string()
    };

    // generate() starts from a cleared cache, so a lock poisoned by a
    // panicked request is safe to reuse.
    let mut model = state.model.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Model lock poisoned by an earlier request; reusing it");
        poisoned.into_inner()
    });
    let output_ids = llm::inference::generate(
        &prompt,
        params,
        &state.tokenizer,
        model.as_mut(),
        &state.eos_token_ids,
    )?;
    let decoded = llm::inference::decode(&state.tokenizer, &output_ids)?;
    drop(model);

    if templated {
        Ok(llm::prompt::postprocess(&decoded))
    } else {
        Ok(decoded)
    }
}
