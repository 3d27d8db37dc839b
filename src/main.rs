use candlecross::cli::{Cli, init_logging, run};
use clap::Parser;

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    run(cli)
}
