use std::env;
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use candle_core::{DType, Device};
use thiserror::Error;

use crate::llm::inference::GenerationParams;

pub const DEFAULT_MODEL_ID: &str = "deepseek-ai/deepseek-coder-1.3b-instruct";
pub const TOP_K: usize = 50;
pub const TOP_P: f64 = 0.9;
pub const MAX_INPUT_TOKENS: usize = 2048;

/// Which flavour of the generation endpoint the server exposes.
///
/// `TestCase` wraps the input in the instruction template, clamps the
/// request parameters and filters the output down to one test case. The
/// other two pass the input through untouched and generate a fixed number
/// of tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    TestCase,
    Freeform,
    Extended,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("max_tokens must be a positive integer, got {0}")]
    NonPositiveMaxTokens(i64),
}

impl Profile {
    pub fn name(&self) -> &'static str {
        match self {
            Profile::TestCase => "testcase",
            Profile::Freeform => "freeform",
            Profile::Extended => "extended",
        }
    }

    pub fn uses_template(&self) -> bool {
        matches!(self, Profile::TestCase)
    }

    pub fn default_temperature(&self) -> f64 {
        match self {
            Profile::TestCase | Profile::Extended => 0.7,
            Profile::Freeform => 1.5,
        }
    }

    /// Turns the optional request fields into concrete sampling parameters.
    pub fn resolve(
        &self,
        temperature: Option<f64>,
        max_tokens: Option<i64>,
        seed: Option<u64>,
    ) -> Result<GenerationParams, ParamError> {
        let temperature = temperature.unwrap_or_else(|| self.default_temperature());

        let params = match self {
            Profile::TestCase => {
                let max_tokens = max_tokens.unwrap_or(150);
                if max_tokens <= 0 {
                    return Err(ParamError::NonPositiveMaxTokens(max_tokens));
                }
                GenerationParams {
                    temperature: temperature.clamp(0.1, 2.0),
                    top_k: TOP_K,
                    top_p: TOP_P,
                    max_new_tokens: max_tokens.min(150) as usize,
                    max_input_tokens: Some(MAX_INPUT_TOKENS),
                    seed,
                }
            }
            Profile::Freeform => GenerationParams {
                temperature,
                top_k: TOP_K,
                top_p: TOP_P,
                max_new_tokens: 200,
                max_input_tokens: None,
                seed,
            },
            Profile::Extended => GenerationParams {
                temperature,
                top_k: TOP_K,
                top_p: TOP_P,
                max_new_tokens: 700,
                max_input_tokens: None,
                seed,
            },
        };

        Ok(params)
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Profile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "testcase" | "test-case" | "tdd" => Ok(Profile::TestCase),
            "freeform" | "free" => Ok(Profile::Freeform),
            "extended" | "long" => Ok(Profile::Extended),
            _ => anyhow::bail!("Unknown profile: {}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceConfig {
    /// GPU 0 when CUDA is available, CPU otherwise
    #[default]
    Auto,
    Cpu,
    Cuda(usize),
}

impl FromStr for DeviceConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(DeviceConfig::Auto),
            "cpu" => Ok(DeviceConfig::Cpu),
            "cuda" | "gpu" => Ok(DeviceConfig::Cuda(0)),
            s if s.starts_with("cuda:") => Ok(DeviceConfig::Cuda(s[5..].parse()?)),
            s if s.starts_with("gpu:") => Ok(DeviceConfig::Cuda(s[4..].parse()?)),
            _ => anyhow::bail!("Unknown device config: {}", s),
        }
    }
}

impl DeviceConfig {
    pub fn resolve(&self) -> candle_core::Result<Device> {
        match self {
            DeviceConfig::Auto => Device::cuda_if_available(0),
            DeviceConfig::Cpu => Ok(Device::Cpu),
            DeviceConfig::Cuda(ordinal) => Device::new_cuda(*ordinal),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DTypeConfig {
    /// F16 on GPU, F32 on CPU
    #[default]
    Auto,
    F16,
    BF16,
    F32,
}

impl FromStr for DTypeConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(DTypeConfig::Auto),
            "f16" | "float16" | "half" => Ok(DTypeConfig::F16),
            "bf16" | "bfloat16" => Ok(DTypeConfig::BF16),
            "f32" | "float32" => Ok(DTypeConfig::F32),
            _ => anyhow::bail!("Unknown dtype: {}", s),
        }
    }
}

impl DTypeConfig {
    pub fn resolve(&self, device: &Device) -> DType {
        match self {
            DTypeConfig::Auto if device.is_cpu() => DType::F32,
            DTypeConfig::Auto | DTypeConfig::F16 => DType::F16,
            DTypeConfig::BF16 => DType::BF16,
            DTypeConfig::F32 => DType::F32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub model_id: String,
    pub revision: String,
    pub profile: Profile,
    pub device: DeviceConfig,
    pub dtype: DTypeConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: "main".to_string(),
            profile: Profile::default(),
            device: DeviceConfig::default(),
            dtype: DTypeConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, overridden by any `TESTCASE_SERVE_*` variables that are set.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(host) = lookup("TESTCASE_SERVE_HOST") {
            self.host = host;
        }

        if let Some(port) = lookup("TESTCASE_SERVE_PORT") {
            self.port = port.parse()?;
        }

        if let Some(model_id) = lookup("TESTCASE_SERVE_MODEL_ID") {
            self.model_id = model_id;
        }

        if let Some(revision) = lookup("TESTCASE_SERVE_REVISION") {
            self.revision = revision;
        }

        if let Some(profile) = lookup("TESTCASE_SERVE_PROFILE") {
            self.profile = profile.parse()?;
        }

        if let Some(device) = lookup("TESTCASE_SERVE_DEVICE") {
            self.device = device.parse()?;
        }

        if let Some(dtype) = lookup("TESTCASE_SERVE_DTYPE") {
            self.dtype = dtype.parse()?;
        }

        Ok(self)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
