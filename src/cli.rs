//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::retry::DEFAULT_MAX_RETRIES;

/// Stream an HTTP resource through a pipeline element.
///
/// `get` downloads a resource with range-request resume and codec
/// detection; `put` uploads a file as a chunked request body.
#[derive(Parser, Debug)]
#[command(name = "http-stream")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// JSON file with the element configuration
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Bound for every blocking network call in seconds (1-3600)
    #[arg(short = 't', long, global = true, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Tag used for log lines and the worker thread name
    #[arg(long, global = true)]
    pub tag: Option<String>,

    /// Extra request header, repeatable (e.g. -H "Icy-MetaData:1")
    #[arg(short = 'H', long = "header", global = true, value_name = "NAME:VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    #[command(subcommand)]
    pub command: Command,
}

/// Transfer direction.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Download a resource with a reader element
    Get {
        /// Resource URL
        url: String,

        /// Output file (stdout when omitted)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Continue from the current size of the output file
        #[arg(long, requires = "output", conflicts_with = "offset")]
        resume: bool,

        /// Start reading at this byte offset
        #[arg(long, value_name = "BYTES")]
        offset: Option<u64>,

        /// Maximum reopen attempts after an interrupted transfer (0-10)
        #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES, value_parser = clap::value_parser!(u32).range(0..=10))]
        retries: u32,
    },

    /// Upload a file with a writer element
    Put {
        /// Resource URL
        url: String,

        /// File to upload
        file: PathBuf,
    },
}

/// Parses `NAME:VALUE`, trimming whitespace around both parts.
fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty in `{raw}`"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_get_defaults() {
        let args = Args::try_parse_from(["http-stream", "get", "http://radio.test/a.mp3"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.headers.is_empty());
        assert_eq!(
            args.command,
            Command::Get {
                url: "http://radio.test/a.mp3".to_string(),
                output: None,
                resume: false,
                offset: None,
                retries: 3,
            }
        );
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["http-stream", "-vv", "get", "http://x.test/"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["http-stream", "get", "http://x.test/", "-v"]).unwrap();
        assert_eq!(args.verbose, 1);
    }

    #[test]
    fn test_cli_headers_are_repeatable() {
        let args = Args::try_parse_from([
            "http-stream",
            "-H",
            "Icy-MetaData: 1",
            "get",
            "http://x.test/",
            "--header",
            "Authorization:Bearer abc",
        ])
        .unwrap();
        assert_eq!(
            args.headers,
            vec![
                ("Icy-MetaData".to_string(), "1".to_string()),
                ("Authorization".to_string(), "Bearer abc".to_string()),
            ]
        );
    }

    #[test]
    fn test_cli_rejects_malformed_header() {
        let result = Args::try_parse_from(["http-stream", "-H", "novalue", "get", "http://x.test/"]);
        assert_eq!(result.unwrap_err().kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_resume_requires_output() {
        let result = Args::try_parse_from(["http-stream", "get", "http://x.test/", "--resume"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn test_cli_resume_conflicts_with_offset() {
        let result = Args::try_parse_from([
            "http-stream",
            "get",
            "http://x.test/",
            "-o",
            "out.bin",
            "--resume",
            "--offset",
            "10",
        ]);
        assert_eq!(result.unwrap_err().kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_timeout_range_is_enforced() {
        let result = Args::try_parse_from(["http-stream", "--timeout", "0", "get", "http://x.test/"]);
        assert!(result.is_err());

        let args =
            Args::try_parse_from(["http-stream", "--timeout", "5", "get", "http://x.test/"]).unwrap();
        assert_eq!(args.timeout, Some(5));
    }

    #[test]
    fn test_cli_put_takes_url_and_file() {
        let args =
            Args::try_parse_from(["http-stream", "put", "http://x.test/up", "take.wav"]).unwrap();
        assert_eq!(
            args.command,
            Command::Put {
                url: "http://x.test/up".to_string(),
                file: PathBuf::from("take.wav"),
            }
        );
    }

    #[test]
    fn test_cli_requires_subcommand() {
        let result = Args::try_parse_from(["http-stream"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let result = Args::try_parse_from(["http-stream", "--version"]);
        assert_eq!(result.unwrap_err().kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
