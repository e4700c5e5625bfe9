//! CLI for the odup uploader.

mod upload;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;

pub use upload::run_upload;

/// Exit status when the run finished but some files were abandoned.
pub const EXIT_PARTIAL: i32 = 2;

/// Upload a file, or every large video file in a directory tree, to OneDrive.
#[derive(Debug, Parser)]
#[command(name = "odup")]
#[command(about = "Resumable, concurrent OneDrive uploader for large media files", long_about = None)]
pub struct Cli {
    /// File or directory to upload.
    pub path: PathBuf,

    /// Destination directory in the drive (created as needed).
    pub destination: String,

    /// Upload up to N files at once (overrides upload.max_concurrent).
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Config file to use instead of ./odup.toml or ~/.config/odup/config.toml.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Do not draw the live dashboard (progress goes to the log only).
    #[arg(long)]
    pub no_dashboard: bool,
}

impl Cli {
    /// Parse `std::env::args`. On failure the message (with usage) has already
    /// been printed and the exit code to use is returned.
    pub fn parse_args() -> std::result::Result<Self, i32> {
        Self::try_parse().map_err(|err| {
            let _ = err.print();
            if err.use_stderr() {
                1
            } else {
                0
            }
        })
    }

    /// Usage line shown with startup errors.
    pub fn usage() -> String {
        Self::command().render_usage().to_string()
    }

    /// Validate the input path, then upload. Returns the process exit code.
    pub async fn run(self) -> Result<i32> {
        if !self.path.exists() {
            eprintln!(
                "error: {} does not exist\n\n{}",
                self.path.display(),
                Self::usage()
            );
            return Ok(1);
        }
        run_upload(&self).await
    }
}
