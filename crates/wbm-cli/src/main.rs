use clap::Parser;
use wbm_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    // Initialize logging as early as possible; fall back to stderr if the
    // state directory is unusable.
    if logging::init_logging(args.verbose).is_err() {
        logging::init_logging_stderr(args.verbose);
    }

    if let Err(err) = cli::run(args).await {
        eprintln!("wbm error: {:#}", err);
        std::process::exit(1);
    }
}
