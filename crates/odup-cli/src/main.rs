use odup_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    // Argument errors must exit with status 1 (clap would use 2).
    let cli = match Cli::parse_args() {
        Ok(cli) => cli,
        Err(code) => std::process::exit(code),
    };

    // Initialize logging as early as possible; the terminal belongs to the dashboard.
    if logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    match cli.run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("odup error: {:#}", err);
            std::process::exit(1);
        }
    }
}
