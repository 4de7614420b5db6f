use clap::Parser;
use stratbench::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
