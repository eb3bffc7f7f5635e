//! Configuration for advisord
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, Subcommand};

use advisor_agent::AgentConfig;
use advisor_sync::{ChunkerConfig, SyncConfig};

/// advisord - keeps each advisor's mail, calendar and CRM searchable and
/// lets an agent answer questions and act on new data
#[derive(Parser, Debug, Clone)]
#[command(name = "advisord")]
#[command(about = "Knowledge sync and agent daemon for financial advisors")]
pub struct Args {
    /// Use the in-memory store and hashing embedder (no MongoDB, no embedding API)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "advisor")]
    pub mongodb_db: String,

    /// Atlas vector search index over `knowledge.embedding`
    #[arg(long, env = "VECTOR_INDEX", default_value = "vector_index")]
    pub vector_index: String,

    /// Chat model configuration
    #[command(flatten)]
    pub llm: LlmArgs,

    /// Embedding model configuration
    #[command(flatten)]
    pub embedding: EmbeddingArgs,

    /// OAuth client credentials
    #[command(flatten)]
    pub oauth: OAuthArgs,

    /// Look-back window for a source that has never been synced
    #[arg(long, env = "MAX_FETCH_DAYS", default_value = "10")]
    pub max_fetch_days: u32,

    /// Maximum records fetched per source per run
    #[arg(long, env = "MAX_FETCH_RECORDS", default_value = "200")]
    pub max_fetch_records: usize,

    /// Seconds between poll-triggered syncs
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "300")]
    pub poll_interval_secs: u64,

    /// Capacity of the queue between ingestion and the reaction worker
    #[arg(long, env = "REACTION_QUEUE_SIZE", default_value = "256")]
    pub reaction_queue_size: usize,

    /// Model rounds before an agent run gives up
    #[arg(long, env = "MAX_AGENT_ROUNDS", default_value = "8")]
    pub max_agent_rounds: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Sweep stale sync latches, then poll every user and react to new data (default)
    Serve,

    /// Run one sync for a user (all connected sources unless one is named)
    Sync {
        #[arg(long)]
        user: String,
        /// mailbox, calendar or crm
        #[arg(long)]
        source: Option<String>,
    },

    /// Ask the agent a question on behalf of a user
    Ask {
        #[arg(long)]
        user: String,
        message: String,
    },

    /// Store Google tokens for an advisor, creating the user if needed
    LoginGoogle {
        #[arg(long)]
        email: String,
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        refresh_token: Option<String>,
        /// Access token lifetime in seconds
        #[arg(long)]
        expires_in: Option<i64>,
    },

    /// Store HubSpot tokens for an existing user
    ConnectCrm {
        #[arg(long)]
        user: String,
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        refresh_token: Option<String>,
        #[arg(long)]
        expires_in: Option<i64>,
    },
}

/// Chat model endpoint
#[derive(Parser, Debug, Clone)]
pub struct LlmArgs {
    /// OpenAI-compatible base URL
    #[arg(long, env = "LLM_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub llm_base_url: String,

    #[arg(long, env = "LLM_MODEL", default_value = "gpt-4o-mini")]
    pub llm_model: String,

    #[arg(long, env = "LLM_API_KEY")]
    pub llm_api_key: Option<String>,
}

/// Embedding model endpoint
#[derive(Parser, Debug, Clone)]
pub struct EmbeddingArgs {
    #[arg(long, env = "EMBEDDING_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub embedding_base_url: String,

    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    pub embedding_model: String,

    #[arg(long, env = "EMBEDDING_API_KEY")]
    pub embedding_api_key: Option<String>,

    /// Vector length the model returns
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value = "1536")]
    pub embedding_dimensions: usize,
}

/// OAuth client credentials used for token refresh
#[derive(Parser, Debug, Clone)]
pub struct OAuthArgs {
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,

    #[arg(long, env = "GOOGLE_CLIENT_SECRET")]
    pub google_client_secret: Option<String>,

    #[arg(long, env = "HUBSPOT_CLIENT_ID")]
    pub hubspot_client_id: Option<String>,

    #[arg(long, env = "HUBSPOT_CLIENT_SECRET")]
    pub hubspot_client_secret: Option<String>,
}

impl OAuthArgs {
    pub fn google(&self) -> Option<(String, String)> {
        self.google_client_id
            .clone()
            .zip(self.google_client_secret.clone())
    }

    pub fn hubspot(&self) -> Option<(String, String)> {
        self.hubspot_client_id
            .clone()
            .zip(self.hubspot_client_secret.clone())
    }
}

impl Args {
    /// Command to run; `serve` when none is given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            max_fetch_days: self.max_fetch_days,
            max_fetch_records: self.max_fetch_records,
            chunker: ChunkerConfig::default(),
        }
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_rounds: self.max_agent_rounds,
            ..AgentConfig::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.oauth.google_client_id.is_some() != self.oauth.google_client_secret.is_some() {
            return Err(
                "GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET must be set together".to_string(),
            );
        }
        if self.oauth.hubspot_client_id.is_some() != self.oauth.hubspot_client_secret.is_some() {
            return Err(
                "HUBSPOT_CLIENT_ID and HUBSPOT_CLIENT_SECRET must be set together".to_string(),
            );
        }

        if !self.dev_mode && self.embedding.embedding_api_key.is_none() {
            return Err("EMBEDDING_API_KEY is required outside dev mode".to_string());
        }

        if self.max_fetch_days == 0 {
            return Err("MAX_FETCH_DAYS must be at least 1".to_string());
        }
        if self.max_fetch_records == 0 {
            return Err("MAX_FETCH_RECORDS must be at least 1".to_string());
        }
        if self.max_agent_rounds == 0 {
            return Err("MAX_AGENT_ROUNDS must be at least 1".to_string());
        }
        if self.poll_interval_secs == 0 {
            return Err("POLL_INTERVAL_SECS must be at least 1".to_string());
        }
        if self.reaction_queue_size == 0 {
            return Err("REACTION_QUEUE_SIZE must be at least 1".to_string());
        }
        if !matches!(self.log_format.to_ascii_lowercase().as_str(), "text" | "json") {
            return Err(format!("LOG_FORMAT must be 'text' or 'json', got '{}'", self.log_format));
        }

        Ok(())
    }
}

/// Show only the first characters of a secret.
pub fn redact(secret: Option<&str>) -> String {
    match secret {
        None => "(unset)".to_string(),
        Some(s) if s.len() <= 4 => "****".to_string(),
        Some(s) => format!("{}****", s.chars().take(4).collect::<String>()),
    }
}
