//! Configuration management for Lumen.
//!
//! Configuration is merged from several sources, lowest precedence first:
//! - Built-in defaults
//! - Config file (`.lumen/config.yaml` or `LUMEN_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric: sessions logs and prompt overrides
//! live under `.lumen/`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Providers the generation factory knows how to build.
pub const KNOWN_PROVIDERS: [&str; 3] = ["serving", "openai", "ollama"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .lumen/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Generation provider ("serving", "openai", "ollama")
    pub provider: String,

    /// Generation model identifier
    pub model: String,

    /// API key for the generation provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Generation provider configurations
    pub llm: Option<LlmConfig>,

    /// Retrieval service connection
    pub retrieval: RetrievalConfig,

    /// Answering engine tunables
    pub engine: EngineSettings,

    /// Domain profile used by the query classifier
    pub domain: DomainProfile,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    /// OpenAI-style chat completions endpoint (model serving gateways, OpenAI)
    ChatCompletions {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        endpoint: Option<String>,
    },
    Ollama {
        endpoint: String,
        model: String,
        timeout: Option<u64>,
    },
}

impl ProviderConfig {
    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::ChatCompletions { model, .. } => model,
            ProviderConfig::Ollama { model, .. } => model,
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ProviderConfig::ChatCompletions { endpoint, .. } => endpoint.as_deref(),
            ProviderConfig::Ollama { endpoint, .. } => Some(endpoint.as_str()),
        }
    }
}

/// Connection settings for the external vector search service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Base URL of the vector search host
    #[serde(default)]
    pub host: Option<String>,

    /// Fully-qualified index name
    #[serde(default = "default_index")]
    pub index: String,

    /// Environment variable holding the bearer token
    #[serde(rename = "tokenEnv", default = "default_token_env")]
    pub token_env: String,

    /// Columns requested from every similarity search
    #[serde(default = "default_columns")]
    pub columns: Vec<String>,
}

fn default_index() -> String {
    "workspace.default.cvip_chunks_vs_index".to_string()
}

fn default_token_env() -> String {
    "LUMEN_RETRIEVAL_TOKEN".to_string()
}

fn default_columns() -> Vec<String> {
    ["chunk_id", "content", "citation_label", "page_number"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            host: None,
            index: default_index(),
            token_env: default_token_env(),
            columns: default_columns(),
        }
    }
}

/// Durable storage used by the persistence buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    /// Append-only JSON lines file
    #[default]
    Jsonl,
    /// SQLite table, one row per turn
    Sqlite,
}

/// Answering engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Run the reranker between retrieval and context assembly
    pub enable_reranking: bool,

    /// Buffer turns and flush them to durable storage
    pub enable_persistence: bool,

    /// Flush once this many turns are pending
    pub flush_every_n: usize,

    /// Flush once the oldest pending turn is this old
    pub flush_every_seconds: u64,

    /// Chunks requested per query
    pub top_k: usize,

    /// Per-chunk character budget in the prompt context
    pub chunk_char_budget: usize,

    /// Generation output bound
    pub max_tokens: u32,

    /// Generation sampling temperature
    pub temperature: f32,

    /// Timeout for each retrieval or generation call
    pub request_timeout_secs: u64,

    /// Sessions idle for longer than this are evicted
    pub session_idle_timeout_secs: u64,

    /// Number of recent turns visible to the classifier
    pub recall_window: usize,

    pub persistence_backend: PersistenceBackend,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enable_reranking: false,
            enable_persistence: true,
            flush_every_n: 5,
            flush_every_seconds: 30,
            top_k: 5,
            chunk_char_budget: 500,
            max_tokens: 800,
            temperature: 0.1,
            request_timeout_secs: 30,
            session_idle_timeout_secs: 1800,
            recall_window: 5,
            persistence_backend: PersistenceBackend::Jsonl,
        }
    }
}

impl EngineSettings {
    /// Check value ranges.
    pub fn validate(&self) -> AppResult<()> {
        if self.flush_every_n < 1 {
            return Err(AppError::Config("flushEveryN must be at least 1".to_string()));
        }
        if self.flush_every_seconds < 1 {
            return Err(AppError::Config(
                "flushEverySeconds must be at least 1".to_string(),
            ));
        }
        if self.top_k < 1 {
            return Err(AppError::Config("topK must be at least 1".to_string()));
        }
        if self.chunk_char_budget < 1 {
            return Err(AppError::Config(
                "chunkCharBudget must be at least 1".to_string(),
            ));
        }
        if self.max_tokens < 1 {
            return Err(AppError::Config("maxTokens must be at least 1".to_string()));
        }
        if !(self.temperature > 0.0 && self.temperature <= 2.0) {
            return Err(AppError::Config(format!(
                "temperature must be in (0, 2], got {}",
                self.temperature
            )));
        }
        if self.request_timeout_secs < 1 {
            return Err(AppError::Config(
                "requestTimeoutSecs must be at least 1".to_string(),
            ));
        }
        if self.session_idle_timeout_secs < 1 {
            return Err(AppError::Config(
                "sessionIdleTimeoutSecs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Vocabulary describing what the engine is able to answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomainProfile {
    /// Human-readable domain name, used in out-of-domain answers
    pub name: String,

    /// Domain terms; an empty list disables the relevance check
    pub keywords: Vec<String>,

    /// Minimum fraction of query terms that must be domain terms
    pub min_relevance: f32,
}

impl Default for DomainProfile {
    fn default() -> Self {
        let keywords = [
            "image", "images", "imaging", "pixel", "vision", "visual", "camera", "edge",
            "detection", "detector", "sobel", "canny", "laplacian", "gradient", "filter",
            "filtering", "convolution", "kernel", "cnn", "neural", "network", "transformer",
            "vit", "attention", "segmentation", "classification", "recognition", "feature",
            "features", "sift", "surf", "orb", "hog", "histogram", "threshold", "thresholding",
            "morphology", "erosion", "dilation", "blur", "gaussian", "noise", "denoising",
            "fourier", "frequency", "wavelet", "color", "colour", "rgb", "hsv", "grayscale",
            "contrast", "brightness", "resolution", "optical", "flow", "stereo", "depth",
            "object", "tracking", "yolo", "rcnn", "resnet", "pooling", "stride", "padding",
            "augmentation", "compression", "jpeg", "interpolation", "resampling", "hough",
            "corner", "harris", "contour", "region", "watershed", "clustering", "kmeans",
            "photo", "video", "frame", "calibration", "homography", "epipolar", "lens",
            "encoder", "decoder", "autoencoder", "gan", "diffusion", "unet", "backbone",
            "bounding", "box", "mask", "keypoint", "descriptor", "matching", "registration",
            "sharpening", "smoothing", "equalization", "transform", "opencv",
        ];
        Self {
            name: "Computer Vision & Image Processing".to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            min_relevance: 0.15,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    retrieval: Option<RetrievalConfig>,
    engine: Option<EngineSettings>,
    domain: Option<DomainProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            llm: None,
            retrieval: RetrievalConfig::default(),
            engine: EngineSettings::default(),
            domain: DomainProfile::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, config file and defaults.
    ///
    /// Environment variables:
    /// - `LUMEN_WORKSPACE`: Override workspace path
    /// - `LUMEN_CONFIG`: Path to config file
    /// - `LUMEN_PROVIDER`: Generation provider
    /// - `LUMEN_MODEL`: Model identifier
    /// - `LUMEN_API_KEY`: API key
    /// - `LUMEN_RETRIEVAL_HOST`: Vector search host
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use lumen_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(None, None)
    }

    /// Load configuration with a workspace and config file chosen up front
    /// (e.g. by command-line flags), ahead of the environment.
    ///
    /// A config file that was named explicitly must exist.
    pub fn load_with(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) =
            workspace.or_else(|| std::env::var("LUMEN_WORKSPACE").ok().map(PathBuf::from))
        {
            config.workspace = workspace;
        }

        config.config_file =
            config_file.or_else(|| std::env::var("LUMEN_CONFIG").ok().map(PathBuf::from));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        match config.config_file.clone() {
            Some(path) => {
                if !path.exists() {
                    return Err(AppError::Config(format!(
                        "Config file does not exist: {:?}",
                        path
                    )));
                }
                config = config.merge_yaml(&path)?;
            }
            None => {
                let default_path = config.lumen_dir().join("config.yaml");
                if default_path.exists() {
                    config = config.merge_yaml(&default_path)?;
                }
            }
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("LUMEN_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("LUMEN_MODEL") {
            config.model = model;
        }

        if let Ok(host) = std::env::var("LUMEN_RETRIEVAL_HOST") {
            config.retrieval.host = Some(host);
        }

        config.api_key = std::env::var("LUMEN_API_KEY").ok();
        config.log_level = std::env::var("RUST_LOG").ok();

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    pub fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> AppResult<Self> {
        let config_file: ConfigFile = serde_yaml::from_str(contents)?;

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();

            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model().to_string();
            }

            result.llm = Some(llm);
        }

        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }

        if let Some(engine) = config_file.engine {
            result.engine = engine;
        }

        if let Some(domain) = config_file.domain {
            result.domain = domain;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .lumen directory.
    pub fn lumen_dir(&self) -> PathBuf {
        self.workspace.join(".lumen")
    }

    /// Ensure the .lumen directory exists.
    pub fn ensure_lumen_dir(&self) -> AppResult<()> {
        let lumen_dir = self.lumen_dir();
        if !lumen_dir.exists() {
            std::fs::create_dir_all(&lumen_dir).map_err(|e| {
                AppError::Config(format!("Failed to create .lumen directory: {}", e))
            })?;
            tracing::debug!(path = %lumen_dir.display(), "Created .lumen directory");
        }
        Ok(())
    }

    /// Location of the persisted turn log for the configured backend.
    pub fn turn_log_path(&self) -> PathBuf {
        let file = match self.engine.persistence_backend {
            PersistenceBackend::Jsonl => "turns.jsonl",
            PersistenceBackend::Sqlite => "turns.sqlite",
        };
        self.lumen_dir().join("sessions").join(file)
    }

    /// Get the configuration block for a provider.
    pub fn get_provider_config(&self, provider: &str) -> Option<ProviderConfig> {
        self.llm
            .as_ref()
            .and_then(|llm| llm.providers.get(provider).cloned())
    }

    /// Resolve the API key for a provider.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        match self.get_provider_config(provider) {
            Some(ProviderConfig::ChatCompletions { api_key_env, .. }) => {
                std::env::var(&api_key_env).ok()
            }
            _ => None,
        }
    }

    /// Resolve the retrieval bearer token from its environment variable.
    pub fn resolve_retrieval_token(&self) -> Option<String> {
        std::env::var(&self.retrieval.token_env).ok()
    }

    /// Validate configuration for the active provider and engine.
    pub fn validate(&self) -> AppResult<()> {
        let provider = &self.provider;

        if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if let Some(ProviderConfig::ChatCompletions { api_key_env, .. }) =
            self.get_provider_config(provider)
        {
            if self.api_key.is_none() && std::env::var(&api_key_env).is_err() {
                return Err(AppError::Config(format!(
                    "API key not found in environment variable: {}",
                    api_key_env
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.domain.min_relevance) {
            return Err(AppError::Config(format!(
                "domain.minRelevance must be in [0, 1], got {}",
                self.domain.min_relevance
            )));
        }

        self.engine.validate()
    }
}
