use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// StayLink real-time chat server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "staylink-chat", version, about = "StayLink real-time chat server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "STAYLINK_PORT", default_value = "8080")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "STAYLINK_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./staylink.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "STAYLINK_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, JWT secret)
    #[arg(long, env = "STAYLINK_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Chat transport tuning (loaded from [chat] section in TOML)
    #[arg(skip)]
    #[serde(default = "default_chat_config")]
    pub chat: Option<ChatConfig>,
}

/// Tuning for the WebSocket transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Seconds between server-side keepalive pings (default: 30)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before closing the connection (default: 10)
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,

    /// Seconds to wait for a message persist before dropping the frame
    /// (default: 10). The read loop never processes two frames of one
    /// connection concurrently, so a stuck store call would otherwise stall
    /// that connection forever.
    #[serde(default = "default_persist_timeout")]
    pub persist_timeout_secs: u64,

    /// Maximum message content length in bytes (default: 4000)
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,

    /// Fan-out policy: "chat" delivers only to connections opened for the
    /// same chat id, "all" is the registry-wide legacy behavior.
    #[serde(default)]
    pub broadcast_scope: BroadcastScope,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastScope {
    /// Deliver only to connections bound to the sender's chat.
    #[default]
    Chat,
    /// Deliver to every connected user except the sender.
    All,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
            persist_timeout_secs: default_persist_timeout(),
            max_message_len: default_max_message_len(),
            broadcast_scope: BroadcastScope::default(),
        }
    }
}

fn default_ping_interval() -> u64 {
    30
}

fn default_pong_timeout() -> u64 {
    10
}

fn default_persist_timeout() -> u64 {
    10
}

fn default_max_message_len() -> usize {
    4000
}

fn default_chat_config() -> Option<ChatConfig> {
    Some(ChatConfig::default())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "0.0.0.0".to_string(),
            config: "./staylink.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            chat: Some(ChatConfig::default()),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (STAYLINK_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("STAYLINK_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# StayLink Chat Server Configuration
# Place this file at ./staylink.toml or specify with --config <path>
# All settings can be overridden via environment variables (STAYLINK_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8080)
# port = 8080

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database and JWT verification secret.
# The secret is shared with the main platform, which issues the tokens.
# data_dir = "./data"

# ---- Chat transport ----
# [chat]

# Keepalive: server pings every ping_interval_secs and closes the
# connection if no pong arrives within pong_timeout_secs.
# ping_interval_secs = 30
# pong_timeout_secs = 10

# A message persist that takes longer than this is abandoned and the
# frame is dropped (the sender is not notified).
# persist_timeout_secs = 10

# Maximum message content length in bytes
# max_message_len = 4000

# Fan-out policy for received messages:
#   "chat" — deliver only to connections opened for the same chat (default)
#   "all"  — deliver to every connected user except the sender
# broadcast_scope = "chat"
"#
    .to_string()
}
