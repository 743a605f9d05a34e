use candle_core::{DType, Device, Result as CandleResult, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Cache, Config, Llama};

/// A causal language model that keeps its own attention cache.
///
/// `forward` takes a `[1, seq_len]` tensor of token ids starting at
/// `position` and returns the logits of the last position as a `[vocab]`
/// tensor.
pub trait Model {
    fn forward(&mut self, input_ids: &Tensor, position: usize) -> CandleResult<Tensor>;
    fn clear_cache(&mut self) -> CandleResult<()>;
    fn device(&self) -> &Device;
}

pub struct LlamaModel {
    inner: Llama,
    cache: Cache,
    cfg: Config,
    dtype: DType,
    device: Device,
}

impl LlamaModel {
    pub fn new(vb: VarBuilder, cfg: &Config, dtype: DType, device: &Device) -> CandleResult<Self> {
        let inner = Llama::load(vb, cfg)?;
        let cache = Cache::new(true, dtype, cfg, device)?;

        Ok(Self {
            inner,
            cache,
            cfg: cfg.clone(),
            dtype,
            device: device.clone(),
        })
    }
}

impl Model for LlamaModel {
    fn forward(&mut self, input_ids: &Tensor, position: usize) -> CandleResult<Tensor> {
        let input_ids = input_ids.to_device(&self.device)?;
        let logits = self.inner.forward(&input_ids, position, &mut self.cache)?;
        logits.squeeze(0)
    }

    fn clear_cache(&mut self) -> CandleResult<()> {
        self.cache = Cache::new(true, self.dtype, &self.cfg, &self.device)?;
        Ok(())
    }

    fn device(&self) -> &Device {
        &self.device
    }
}
