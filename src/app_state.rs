use std::sync::Mutex;

use tokenizers::Tokenizer;

use crate::config::Profile;
use crate::llm;

pub struct AppState {
    /// Generation holds this lock from tokenization to decoding, so a
    /// process runs one inference at a time.
    pub model: Mutex<Box<dyn llm::models::Model + Send>>,
    pub tokenizer: Tokenizer,
    pub model_name: String,
    pub profile: Profile,
    pub eos_token_ids: Vec<u32>,
}

impl AppState {
    pub fn new(
        model: Box<dyn llm::models::Model + Send>,
        tokenizer: Tokenizer,
        model_name: impl Into<String>,
        profile: Profile,
        eos_token_ids: Vec<u32>,
    ) -> Self {
        Self {
            model: Mutex::new(model),
            tokenizer,
            model_name: model_name.into(),
            profile,
            eos_token_ids,
        }
    }
}
