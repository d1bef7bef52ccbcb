//! Command-line interface using clap derive macros.
//!
//! Subcommands: login, logout, status, cleanup, get, post.

use clap::{Parser, Subcommand};

/// Cooperative portal client: signs in, keeps credentials encrypted at rest,
/// and sends authenticated requests.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "coop-portal")]
#[command(version, about, long_about = None)]
pub struct Invocation {
    /// Path to the TOML configuration file
    #[arg(long, env = "CONFIG_PATH", global = true)]
    pub config: Option<String>,

    /// Print Prometheus metrics to stderr on exit
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Store a credential pair issued by the portal.
    Login {
        /// Access token
        access: String,
        /// Refresh token
        refresh: String,
    },

    /// Clear the stored credential pair.
    Logout,

    /// Show vault and session state as JSON.
    Status,

    /// Evict expired credentials.
    Cleanup,

    /// Send an authenticated GET.
    Get {
        /// API path, relative to `api.base_url`
        path: String,
    },

    /// Send an authenticated POST with a JSON body.
    Post {
        /// API path, relative to `api.base_url`
        path: String,
        /// Request body
        #[arg(value_parser = parse_json)]
        body: serde_json::Value,
    },
}

fn parse_json(raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("post body must be valid JSON: {e}"))
}
