//! strata CLI: validate and run YAML programs, decode wire documents.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "strata",
    version,
    about = "Declarative infrastructure programs over an asynchronous property model"
)]
struct Cli {
    /// Log at debug level (STRATA_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: strata::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    strata::logging::init_logging(cli.verbose);
    if let Err(e) = strata::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
