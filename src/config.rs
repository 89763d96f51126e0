use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::services::search::operators::{OperatorTuning, Wave};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub search: SearchConfig,
    pub linking: LinkingConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Per-wave soft budgets in milliseconds. VECTOR has no sync budget: it is
/// only invoked by the linking-ladder path.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WaveBudgets {
    pub exact_ms: u64,
    pub ilike_ms: u64,
    pub trigram_ms: u64,
}

impl Default for WaveBudgets {
    fn default() -> Self {
        Self { exact_ms: 100, ilike_ms: 300, trigram_ms: 800 }
    }
}

/// Planner/executor knobs. Defaults follow the shipped tuning; every value
/// can be overridden from the config file or environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Column used as the tenant isolation key.
    pub tenant_column_name: String,
    /// Per-table cap on rows before UNION.
    pub default_table_limit: u32,
    /// Final row cap.
    pub global_limit: u32,
    pub wave_budgets: WaveBudgets,
    /// Total sync deadline.
    pub total_budget_ms: u64,
    /// Early-exit threshold on accumulated deduplicated rows.
    pub strong_hit_count: usize,
    /// Max concurrent probes per wave.
    pub fan_out: usize,
    /// Hard cap on queued probes; beyond this the plan fails fast.
    pub queue_cap: usize,
    pub trigram_threshold: f64,
    pub vector_threshold: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tenant_column_name: "yacht_id".to_string(),
            default_table_limit: 20,
            global_limit: 50,
            wave_budgets: WaveBudgets::default(),
            total_budget_ms: 800,
            strong_hit_count: 5,
            fan_out: 8,
            queue_cap: 64,
            trigram_threshold: 0.3,
            vector_threshold: 0.70,
        }
    }
}

impl SearchConfig {
    pub fn wave_budget_ms(&self, wave: Wave) -> u64 {
        match wave {
            Wave::Exact => self.wave_budgets.exact_ms,
            Wave::Ilike => self.wave_budgets.ilike_ms,
            Wave::Trigram => self.wave_budgets.trigram_ms,
            // Vector never runs inside the sync plan; give it the full
            // remaining window if it ever does.
            Wave::Vector => self.total_budget_ms,
        }
    }

    pub fn operator_tuning(&self) -> OperatorTuning {
        OperatorTuning {
            trigram_threshold: self.trigram_threshold,
            vector_threshold: self.vector_threshold,
        }
    }
}

/// Hybrid fusion weights. Kept summing to 1.0; `validate()` enforces it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HybridWeights {
    pub text: f64,
    pub vector: f64,
    pub recency: f64,
    pub bias: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self { text: 0.45, vector: 0.35, recency: 0.15, bias: 0.05 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkingConfig {
    pub hybrid_weights: HybridWeights,
    pub rrf_k: f64,
    pub rrf_alpha: f64,
    /// Logistic normalization for raw cosine scores.
    pub vector_mu: f64,
    pub vector_sigma: f64,
    /// Domains excluded from L4 vendor affinity.
    pub personal_email_domains: Vec<String>,
    /// Non-primary suggestions persisted per thread.
    pub max_alternates: usize,
    /// Recency window handed to the fused-retrieval procedure.
    pub days_back: i32,
    /// Candidate cap per hybrid retrieval.
    pub candidate_limit: i64,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            hybrid_weights: HybridWeights::default(),
            rrf_k: 60.0,
            rrf_alpha: 0.7,
            vector_mu: 0.72,
            vector_sigma: 0.05,
            personal_email_domains: [
                "gmail.com",
                "yahoo.com",
                "hotmail.com",
                "outlook.com",
                "icloud.com",
                "aol.com",
                "mail.com",
                "protonmail.com",
            ]
            .iter()
            .map(|d| (*d).to_string())
            .collect(),
            max_alternates: 3,
            days_back: 365,
            candidate_limit: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            timeout_secs: 10,
        }
    }
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "pelorus")]
#[command(version, about = "Pelorus - Federated PMS Search Service")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Logging level (overrides config file, e.g., "info,pelorus=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Total sync search budget in milliseconds (overrides config file)
    #[arg(long, value_name = "MS")]
    pub total_budget_ms: Option<u64>,

    /// Max concurrent probes per wave (overrides config file)
    #[arg(long, value_name = "N")]
    pub fan_out: Option<usize>,

    /// Early-exit row threshold (overrides config file)
    #[arg(long, value_name = "N")]
    pub strong_hit_count: Option<usize>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with APP_)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();

        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(&cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_SERVER_HOST / APP_SERVER_PORT
    /// - APP_DATABASE_URL
    /// - APP_LOG_LEVEL
    /// - APP_TOTAL_BUDGET_MS / APP_FAN_OUT / APP_STRONG_HIT_COUNT
    /// - APP_EMBEDDING_API_KEY / APP_EMBEDDING_BASE_URL
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
            tracing::info!("Override server.port from env: {}", self.server.port);
        }

        if let Ok(db_url) = std::env::var("APP_DATABASE_URL") {
            self.database.url = db_url;
            tracing::info!("Override database.url from env");
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(budget) = std::env::var("APP_TOTAL_BUDGET_MS")
            && let Ok(budget) = budget.parse()
        {
            self.search.total_budget_ms = budget;
            tracing::info!("Override search.total_budget_ms from env: {}", budget);
        }

        if let Ok(fan_out) = std::env::var("APP_FAN_OUT")
            && let Ok(fan_out) = fan_out.parse()
        {
            self.search.fan_out = fan_out;
            tracing::info!("Override search.fan_out from env: {}", fan_out);
        }

        if let Ok(count) = std::env::var("APP_STRONG_HIT_COUNT")
            && let Ok(count) = count.parse()
        {
            self.search.strong_hit_count = count;
            tracing::info!("Override search.strong_hit_count from env: {}", count);
        }

        if let Ok(key) = std::env::var("APP_EMBEDDING_API_KEY") {
            self.embedding.api_key = key;
            tracing::info!("Override embedding.api_key from env");
        }

        if let Ok(url) = std::env::var("APP_EMBEDDING_BASE_URL") {
            self.embedding.base_url = url;
            tracing::info!("Override embedding.base_url from env");
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
            tracing::info!("Override server.host from CLI: {}", self.server.host);
        }

        if let Some(port) = args.server_port {
            self.server.port = port;
            tracing::info!("Override server.port from CLI: {}", self.server.port);
        }

        if let Some(db_url) = &args.database_url {
            self.database.url = db_url.clone();
            tracing::info!("Override database.url from CLI");
        }

        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }

        if let Some(budget) = args.total_budget_ms {
            self.search.total_budget_ms = budget;
            tracing::info!("Override search.total_budget_ms from CLI: {}", budget);
        }

        if let Some(fan_out) = args.fan_out {
            self.search.fan_out = fan_out;
            tracing::info!("Override search.fan_out from CLI: {}", fan_out);
        }

        if let Some(count) = args.strong_hit_count {
            self.search.strong_hit_count = count;
            tracing::info!("Override search.strong_hit_count from CLI: {}", count);
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.search.fan_out == 0 {
            anyhow::bail!("search.fan_out must be > 0");
        }
        if self.search.queue_cap < self.search.fan_out {
            anyhow::bail!("search.queue_cap must be >= search.fan_out");
        }
        if self.search.total_budget_ms == 0 {
            anyhow::bail!("search.total_budget_ms must be > 0");
        }
        if !(0.0..=1.0).contains(&self.search.trigram_threshold) {
            anyhow::bail!("search.trigram_threshold must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.search.vector_threshold) {
            anyhow::bail!("search.vector_threshold must be in [0, 1]");
        }

        let w = &self.linking.hybrid_weights;
        let sum = w.text + w.vector + w.recency + w.bias;
        if (sum - 1.0).abs() > 1e-6 {
            anyhow::bail!("linking.hybrid_weights must sum to 1.0 (got {sum})");
        }
        if !(0.0..=1.0).contains(&self.linking.rrf_alpha) {
            anyhow::bail!("linking.rrf_alpha must be in [0, 1]");
        }

        if self.embedding.enabled && self.embedding.api_key.is_empty() {
            tracing::warn!("Embedding enabled but no API key set; vector signals degrade to skip");
        }

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "postgres://localhost/pelorus".to_string(), max_connections: 10 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,pelorus=debug".to_string(), file: Some("logs/pelorus.log".to_string()) }
    }
}
