//! Tests for CLI argument parsing and result rendering.

use super::*;
use clap::Parser;

// ============================================================================
// Test: Argument Parsing
// ============================================================================

#[test]
fn test_sync_parses_tag_and_force() {
    let cli = Cli::try_parse_from([
        "waypost",
        "sync",
        "--tag",
        "retail",
        "--force",
        "--provider-url",
        "https://api.example.com",
        "--api-key",
        "key_123",
    ])
    .unwrap();

    match cli.command {
        Commands::Sync {
            tag,
            force,
            provider_url,
            definitions,
            ..
        } => {
            assert_eq!(tag.as_deref(), Some("retail"));
            assert!(force);
            assert_eq!(provider_url, "https://api.example.com");
            assert_eq!(definitions, PathBuf::from("geofences.yaml"));
        }
        _ => panic!("expected sync command"),
    }
}

#[test]
fn test_sync_defaults_to_no_filter_no_force() {
    let cli = Cli::try_parse_from([
        "waypost",
        "sync",
        "--provider-url",
        "https://api.example.com",
        "--api-key",
        "key_123",
    ])
    .unwrap();

    match cli.command {
        Commands::Sync {
            tag,
            force,
            call_timeout_seconds,
            recency_window_seconds,
            format,
            ..
        } => {
            assert!(tag.is_none());
            assert!(!force);
            assert_eq!(call_timeout_seconds, 10);
            assert_eq!(recency_window_seconds, 900);
            assert_eq!(format, OutputFormat::Text);
        }
        _ => panic!("expected sync command"),
    }
}

#[test]
fn test_config_command_parses_file() {
    let cli = Cli::try_parse_from(["waypost", "config", "--file", "fences.yaml"]).unwrap();

    match cli.command {
        Commands::Config { file } => assert_eq!(file, PathBuf::from("fences.yaml")),
        _ => panic!("expected config command"),
    }
}

#[test]
fn test_unknown_subcommand_is_rejected() {
    assert!(Cli::try_parse_from(["waypost", "teleport"]).is_err());
}

// ============================================================================
// Test: Exit Code Semantics
// ============================================================================

#[test]
fn test_clean_result_maps_to_exit_ok() {
    let result = SyncResult {
        created: 2,
        updated: 3,
        skipped: 1,
        failed: 0,
        failures: vec![],
    };
    assert!(result.is_clean());

    let code = if result.is_clean() {
        EXIT_OK
    } else {
        EXIT_PARTIAL_FAILURE
    };
    assert_eq!(code, EXIT_OK);
}

#[test]
fn test_failed_result_maps_to_partial_failure_exit() {
    let result = SyncResult {
        created: 1,
        updated: 0,
        skipped: 0,
        failed: 1,
        failures: vec![waypost_core::SyncFailure {
            geofence_id: waypost_core::GeofenceId::new(),
            reason: "provider rejected geometry".to_string(),
        }],
    };
    assert!(!result.is_clean());

    let code = if result.is_clean() {
        EXIT_OK
    } else {
        EXIT_PARTIAL_FAILURE
    };
    assert_eq!(code, EXIT_PARTIAL_FAILURE);
}
