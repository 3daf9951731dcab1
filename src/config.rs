//! Configuration for an extraction run.
//!
//! Every knob lives in [`ExtractionConfig`], built through
//! [`ExtractionConfigBuilder`]. One config is shared by all document tasks
//! of a batch; it is cheap to clone (the provider and callback are `Arc`s).

use crate::error::EsgError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for an extraction run.
///
/// # Example
/// ```rust
/// use esg_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .concurrency(2)
///     .pages_per_scan(5)
///     .max_retries(3)
///     .build()
///     .unwrap();
/// assert_eq!(config.pages_per_scan, 5);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Documents allowed in a render/oracle call at the same time. Default: 4.
    ///
    /// This is a process-wide admission gate, not a thread count. Lower it if
    /// the model API answers with `429`.
    pub concurrency: usize,

    /// Ranked pages sent to the oracle per attempt. Default: 10.
    pub pages_per_scan: usize,

    /// Attempt budget per document. Default: 3.
    ///
    /// Attempt `k` scans ranked pages `[k·W, (k+1)·W)`, so a document is never
    /// shown more than `max_retries × pages_per_scan` pages.
    pub max_retries: usize,

    /// Rendering DPI. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Cap on either rendered image dimension, in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Model identifier. If None, `gpt-4o-2024-08-06`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the model may generate per attempt. Default: 4096.
    pub max_tokens: usize,

    /// Upper bound on one oracle call, in seconds. Default: 60.
    ///
    /// A call that runs over is treated like any other oracle failure: the
    /// attempt is spent and the loop moves to the next batch.
    pub api_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom system prompt. If None, uses the built-in ESG analyst prompt.
    pub system_prompt: Option<String>,

    /// Root for per-document JSON files. None disables persistence.
    pub output_dir: Option<PathBuf>,

    /// Optional observer for batch and attempt events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            pages_per_scan: 10,
            max_retries: 3,
            dpi: 150,
            max_rendered_pixels: 2000,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            api_timeout_secs: 60,
            password: None,
            system_prompt: None,
            output_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("concurrency", &self.concurrency)
            .field("pages_per_scan", &self.pages_per_scan)
            .field("max_retries", &self.max_retries)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("output_dir", &self.output_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Most pages a single document can be shown across all attempts.
    pub fn page_budget(&self) -> usize {
        self.max_retries.saturating_mul(self.pages_per_scan)
    }
}

/// Builder for [`ExtractionConfig`].
///
/// Setters store values as given; range checks happen once in [`build`](Self::build).
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn pages_per_scan(mut self, n: usize) -> Self {
        self.config.pages_per_scan = n;
        self
    }

    pub fn max_retries(mut self, n: usize) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, EsgError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(EsgError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(EsgError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.pages_per_scan == 0 {
            return Err(EsgError::InvalidConfig("Pages per scan must be ≥ 1".into()));
        }
        if c.max_retries == 0 {
            return Err(EsgError::InvalidConfig("Max retries must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(EsgError::InvalidConfig("API timeout must be ≥ 1s".into()));
        }
        Ok(self.config)
    }
}
