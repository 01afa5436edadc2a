use std::path::PathBuf;

use clap::{Parser, Subcommand};
use filebin_uploader::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "filebin-upload")]
#[command(about = "Upload files to a filebin bin and manage bins", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Filebin server base URL (overrides config)
    #[arg(long, global = true, env = "FILEBIN_SERVER")]
    pub server: Option<String>,

    /// Client id sent as the CID header (overrides config)
    #[arg(long, global = true, env = "FILEBIN_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Print events and results as JSON lines on stdout
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload files into a bin
    Upload {
        /// Target bin
        #[arg(long, short = 'b')]
        bin: String,

        /// Maximum number of concurrent uploads
        #[arg(long, short = 'j')]
        concurrency: Option<usize>,

        /// Maximum retries per file
        #[arg(long)]
        max_retries: Option<u32>,

        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Delete a file or bin by URL
    Delete {
        /// URL (absolute, or relative to the server)
        url: String,
    },
    /// Lock a bin
    Lock {
        /// Bin to lock
        bin: String,
    },
    /// Approve a bin
    Approve {
        /// Bin to approve
        bin: String,
    },
    /// Write a default config file to the --config path
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_upload() {
        let cli = Cli::try_parse_from([
            "filebin-upload",
            "--json",
            "upload",
            "--bin",
            "mybin",
            "-j",
            "2",
            "a.txt",
            "b.txt",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(cli.config, DEFAULT_CONFIG_PATH);
        match cli.command {
            Commands::Upload {
                bin,
                concurrency,
                max_retries,
                files,
            } => {
                assert_eq!(bin, "mybin");
                assert_eq!(concurrency, Some(2));
                assert_eq!(max_retries, None);
                assert_eq!(files, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
            }
            _ => panic!("expected upload"),
        }
    }

    #[test]
    fn test_parse_init_config() {
        let cli =
            Cli::try_parse_from(["filebin-upload", "-c", "/tmp/app.toml", "init-config"]).unwrap();
        assert_eq!(cli.config, "/tmp/app.toml");
        assert!(matches!(cli.command, Commands::InitConfig { force: false }));
    }

    #[test]
    fn test_upload_requires_files() {
        assert!(Cli::try_parse_from(["filebin-upload", "upload", "--bin", "mybin"]).is_err());
    }
}
