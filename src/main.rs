//! CLI entry point for the http-stream tool.

use std::io::{self, IsTerminal};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use http_stream::{Role, StreamConfig};
use tracing::{debug, info};

mod cli;
mod retry;
mod runner;

use cli::{Args, Command};

fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr so `get` without -o can stream the body to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = build_config(&args)?;
    let target = runner::describe_output(&args.command);
    let show_progress = !args.quiet && io::stderr().is_terminal();

    info!(tag = %config.tag, role = %config.role, %target, "http-stream starting");
    let report = runner::run_on_worker(config, args.headers, args.command, show_progress)?;

    info!(
        transferred = report.transferred,
        byte_pos = report.byte_pos,
        total = ?report.total_bytes,
        codec = %report.codec,
        reopens = report.reopens,
        "Transfer complete"
    );
    Ok(())
}

/// Loads the element configuration and applies the command-line overrides.
fn build_config(args: &Args) -> Result<StreamConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            StreamConfig::from_json_str(&json)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => StreamConfig::default(),
    };

    config.role = match args.command {
        Command::Get { .. } => Role::Reader,
        Command::Put { .. } => Role::Writer,
    };
    if let Some(secs) = args.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    if let Some(tag) = &args.tag {
        config = config.with_tag(tag.clone());
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_applies_overrides() {
        let args = Args::try_parse_from([
            "http-stream",
            "--timeout",
            "7",
            "--tag",
            "radio",
            "put",
            "http://x.test/up",
            "a.wav",
        ])
        .unwrap();
        let config = build_config(&args).unwrap();
        assert_eq!(config.role, Role::Writer);
        assert_eq!(config.timeout(), Duration::from_secs(7));
        assert_eq!(config.tag, "radio");
    }

    #[test]
    fn test_build_config_reads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.json");
        std::fs::write(&path, r#"{"timeout_secs": 12, "tag": "from-file"}"#).unwrap();
        let args = Args::try_parse_from([
            "http-stream",
            "--config",
            path.to_str().unwrap(),
            "get",
            "http://x.test/a.mp3",
        ])
        .unwrap();

        let config = build_config(&args).unwrap();

        assert_eq!(config.role, Role::Reader);
        assert_eq!(config.timeout_secs, 12);
        assert_eq!(config.tag, "from-file");
    }

    #[test]
    fn test_build_config_rejects_blank_tag() {
        let args =
            Args::try_parse_from(["http-stream", "--tag", " ", "get", "http://x.test/"]).unwrap();
        assert!(build_config(&args).is_err());
    }
}
