#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use candle_core::{Device, Result as CandleResult, Tensor};
use serde_json::Value;
use tokenizers::models::wordlevel::WordLevel;
use tokenizers::pre_tokenizers::whitespace::WhitespaceSplit;
use tokenizers::{AddedToken, Tokenizer};
use tower::ServiceExt;

use testcase_serve::api::server::create_router;
use testcase_serve::config::Profile;
use testcase_serve::llm::models::Model;
use testcase_serve::AppState;

pub const VOCAB: [&str; 11] = [
    "<unk>",
    "<eos>",
    "<</INSTRUCTION>>",
    "Test",
    "case:",
    "Reason:",
    "Example:",
    "add",
    "sum",
    "numbers",
    "more",
];

pub fn id(word: &str) -> u32 {
    VOCAB.iter().position(|w| *w == word).expect("word in vocab") as u32
}

/// Whitespace-split word tokenizer; anything outside `VOCAB` becomes a
/// special `<unk>` that decoding skips.
pub fn tokenizer() -> Tokenizer {
    let vocab: HashMap<String, u32> = VOCAB
        .iter()
        .enumerate()
        .map(|(id, word)| (word.to_string(), id as u32))
        .collect();
    let model = WordLevel::builder()
        .vocab(vocab.into_iter().collect())
        .unk_token("<unk>".to_string())
        .build()
        .expect("word level model");
    let mut tokenizer = Tokenizer::new(model);
    tokenizer.with_pre_tokenizer(Some(WhitespaceSplit));
    tokenizer.add_special_tokens(&[AddedToken::from("<unk>", true)]);
    tokenizer
}

#[derive(Default)]
pub struct Probe {
    pub forwards: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

/// Emits `script` one token per forward call, then `<eos>` forever.
pub struct ScriptedModel {
    script: Vec<u32>,
    step: usize,
    delay: Duration,
    probe: Arc<Probe>,
    device: Device,
}

impl ScriptedModel {
    pub fn new(words: &[&str], probe: Arc<Probe>) -> Self {
        Self {
            script: words.iter().map(|w| id(w)).collect(),
            step: 0,
            delay: Duration::ZERO,
            probe,
            device: Device::Cpu,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Model for ScriptedModel {
    fn forward(&mut self, _input_ids: &Tensor, _position: usize) -> CandleResult<Tensor> {
        let in_flight = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        self.probe.forwards.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);

        let target = self.script.get(self.step).copied().unwrap_or(id("<eos>"));
        self.step += 1;
        let logits: Vec<f32> = (0..VOCAB.len() as u32)
            .map(|id| if id == target { 30.0 } else { 0.0 })
            .collect();

        self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);
        Tensor::new(logits.as_slice(), &self.device)
    }

    fn clear_cache(&mut self) -> CandleResult<()> {
        self.step = 0;
        Ok(())
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

pub fn app(profile: Profile, model: ScriptedModel) -> Router {
    let state = AppState::new(
        Box::new(model),
        tokenizer(),
        "stub/scripted",
        profile,
        vec![id("<eos>")],
    );
    create_router(Arc::new(state))
}

pub async fn post_generate(app: Router, body: impl Into<Body>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/generate")
        .header("content-type", "application/json")
        .body(body.into())
        .expect("request");

    let response = app.oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body read must succeed");
    let json = serde_json::from_slice(&bytes).expect("body must be valid JSON");
    (status, json)
}
