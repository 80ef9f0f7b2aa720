//! # Waypost CLI
//!
//! Command-line interface for the Waypost geofence integration system.
//!
//! This module provides CLI commands for:
//! - Triggering a geofence sync run against the provider
//! - Validating local geofence definition files
//! - Generating shell completions
//!
//! The sync command is the operator/scheduler entry point: it reports
//! created/updated/skipped/failed counts plus itemized reasons, and its
//! exit status distinguishes "all succeeded" from "one or more failed" so
//! schedulers can alert.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use waypost_core::{
    GeofenceTag, SyncConfig, SyncOptions, SyncReconciler, SyncResult,
};

pub mod geofence_store;
pub mod provider_client;

pub use geofence_store::YamlGeofenceStore;
pub use provider_client::RestProviderClient;

/// Exit code when every definition synced cleanly
pub const EXIT_OK: i32 = 0;
/// Exit code when one or more definitions failed
pub const EXIT_PARTIAL_FAILURE: i32 = 1;
/// Exit code for configuration or usage errors
pub const EXIT_CONFIG_ERROR: i32 = 2;

// ============================================================================
// CLI Structure
// ============================================================================

/// Waypost CLI - Geofence synchronization against the location provider
#[derive(Parser)]
#[command(name = "waypost")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Geofence event integration tooling")]
#[command(
    long_about = "Waypost keeps locally authoritative geofence definitions \
                  in sync with the external location provider"
)]
pub struct Cli {
    /// Logging level
    #[arg(short, long, default_value = "info", env = "WAYPOST_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize local geofence definitions to the provider
    Sync {
        /// Path to the local geofence definitions file
        #[arg(short, long, default_value = "geofences.yaml", env = "WAYPOST_DEFINITIONS")]
        definitions: PathBuf,

        /// Restrict the run to definitions carrying this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Re-push every matching definition regardless of sync recency
        #[arg(short, long)]
        force: bool,

        /// Base URL of the provider API
        #[arg(long, env = "WAYPOST_PROVIDER_URL")]
        provider_url: String,

        /// Provider API key
        #[arg(long, env = "WAYPOST_PROVIDER_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Timeout per provider call, in seconds
        #[arg(long, default_value = "10")]
        call_timeout_seconds: u64,

        /// Recency window for the non-force short-circuit, in seconds
        #[arg(long, default_value = "900")]
        recency_window_seconds: u64,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Validate a geofence definitions file
    Config {
        /// Definitions file to validate
        #[arg(short, long, default_value = "geofences.yaml")]
        file: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Output format options
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

// ============================================================================
// Command Execution
// ============================================================================

/// Execute the parsed CLI command, returning the process exit code.
pub async fn execute(cli: Cli) -> i32 {
    match cli.command {
        Commands::Sync {
            definitions,
            tag,
            force,
            provider_url,
            api_key,
            call_timeout_seconds,
            recency_window_seconds,
            format,
        } => {
            run_sync(SyncInvocation {
                definitions,
                tag,
                force,
                provider_url,
                api_key,
                call_timeout: Duration::from_secs(call_timeout_seconds),
                recency_window: Duration::from_secs(recency_window_seconds),
                format,
            })
            .await
        }
        Commands::Config { file } => run_config_check(&file).await,
        Commands::Completions { shell } => {
            use clap::CommandFactory;
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "waypost",
                &mut std::io::stdout(),
            );
            EXIT_OK
        }
    }
}

/// Resolved arguments for one sync run
pub struct SyncInvocation {
    pub definitions: PathBuf,
    pub tag: Option<String>,
    pub force: bool,
    pub provider_url: String,
    pub api_key: String,
    pub call_timeout: Duration,
    pub recency_window: Duration,
    pub format: OutputFormat,
}

async fn run_sync(invocation: SyncInvocation) -> i32 {
    let tag = match invocation.tag.map(GeofenceTag::new).transpose() {
        Ok(tag) => tag,
        Err(e) => {
            error!(error = %e, "Invalid tag filter");
            return EXIT_CONFIG_ERROR;
        }
    };

    let store = match YamlGeofenceStore::open(&invocation.definitions).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(
                path = %invocation.definitions.display(),
                error = %e,
                "Could not open geofence definitions"
            );
            return EXIT_CONFIG_ERROR;
        }
    };

    let provider = match RestProviderClient::new(
        &invocation.provider_url,
        &invocation.api_key,
        invocation.call_timeout,
    ) {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            error!(error = %e, "Invalid provider configuration");
            return EXIT_CONFIG_ERROR;
        }
    };

    let reconciler = SyncReconciler::new(
        store,
        provider,
        SyncConfig {
            call_timeout: invocation.call_timeout,
            recency_window: invocation.recency_window,
        },
    );

    let result = match reconciler
        .sync_all(SyncOptions {
            tag,
            force: invocation.force,
        })
        .await
    {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "Sync run aborted");
            return EXIT_CONFIG_ERROR;
        }
    };

    render_sync_result(&result, &invocation.format);

    if result.is_clean() {
        EXIT_OK
    } else {
        EXIT_PARTIAL_FAILURE
    }
}

/// Render a sync result to stdout.
///
/// Partial success is reported plainly — counts plus itemized reasons —
/// never collapsed into a single opaque failure.
pub fn render_sync_result(result: &SyncResult, format: &OutputFormat) {
    match format {
        OutputFormat::Json => {
            // SyncResult is fully serializable; failures included
            match serde_json::to_string_pretty(result) {
                Ok(json) => println!("{}", json),
                Err(e) => error!(error = %e, "Could not serialize sync result"),
            }
        }
        OutputFormat::Text => {
            println!(
                "Sync complete: {} created, {} updated, {} skipped, {} failed",
                result.created, result.updated, result.skipped, result.failed
            );
            if !result.failures.is_empty() {
                println!("Failures:");
                for failure in &result.failures {
                    println!("  {}: {}", failure.geofence_id, failure.reason);
                }
            }
        }
    }
}

async fn run_config_check(file: &PathBuf) -> i32 {
    match YamlGeofenceStore::open(file).await {
        Ok(store) => {
            let count = store.definition_count();
            println!(
                "{}: {} geofence definition(s), all valid",
                file.display(),
                count
            );
            EXIT_OK
        }
        Err(e) => {
            eprintln!("{}: invalid definitions file: {}", file.display(), e);
            EXIT_CONFIG_ERROR
        }
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
