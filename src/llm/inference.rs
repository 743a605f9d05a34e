use candle_core::{Result as CandleResult, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use tokenizers::Tokenizer;

use crate::llm::models::Model;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    /// Values `<= 0` switch to greedy decoding
    pub temperature: f64,
    pub top_k: usize,
    pub top_p: f64,
    pub max_new_tokens: usize,
    /// Prompt tokens past this count are dropped
    pub max_input_tokens: Option<usize>,
    pub seed: Option<u64>,
}

impl GenerationParams {
    pub fn sampling(&self) -> Sampling {
        if self.temperature <= 0.0 {
            Sampling::ArgMax
        } else {
            Sampling::TopKThenTopP {
                k: self.top_k,
                p: self.top_p,
                temperature: self.temperature,
            }
        }
    }
}

pub fn encode(
    prompt: &str,
    tokenizer: &Tokenizer,
    max_input_tokens: Option<usize>,
) -> CandleResult<Vec<u32>> {
    let encoding = tokenizer
        .encode(prompt, true)
        .map_err(|e| candle_core::Error::msg(e.to_string()))?;
    let mut input_ids = encoding.get_ids().to_vec();

    if let Some(max_len) = max_input_tokens {
        input_ids.truncate(max_len);
    }

    Ok(input_ids)
}

/// Runs one generation pass and returns prompt plus generated token ids.
///
/// Generation stops after `max_new_tokens` tokens or at the first token in
/// `eos_token_ids`, which is not included in the output.
pub fn generate(
    prompt: &str,
    params: &GenerationParams,
    tokenizer: &Tokenizer,
    model: &mut dyn Model,
    eos_token_ids: &[u32],
) -> CandleResult<Vec<u32>> {
    let mut input_ids = encode(prompt, tokenizer, params.max_input_tokens)?;
    if input_ids.is_empty() || params.max_new_tokens == 0 {
        return Ok(input_ids);
    }

    let seed = params.seed.unwrap_or_else(rand::random);
    let mut logits_processor = LogitsProcessor::from_sampling(seed, params.sampling());

    model.clear_cache()?;

    let device = model.device().clone();
    let prompt_tensor = Tensor::new(input_ids.as_slice(), &device)?.unsqueeze(0)?;
    let logits = model.forward(&prompt_tensor, 0)?;
    let mut next_token = logits_processor.sample(&logits)?;

    for _ in 1..params.max_new_tokens {
        if eos_token_ids.contains(&next_token) {
            return Ok(input_ids);
        }
        input_ids.push(next_token);

        let position = input_ids.len() - 1;
        let input_tensor = Tensor::new(&[next_token], &device)?.unsqueeze(0)?;
        let logits = model.forward(&input_tensor, position)?;
        next_token = logits_processor.sample(&logits)?;
    }

    if !eos_token_ids.contains(&next_token) {
        input_ids.push(next_token);
    }

    Ok(input_ids)
}

pub fn decode(tokenizer: &Tokenizer, ids: &[u32]) -> CandleResult<String> {
    tokenizer
        .decode(ids, true)
        .map_err(|e| candle_core::Error::msg(e.to_string()))
}
