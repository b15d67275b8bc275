use clap::Parser;
use particle_scope::cli::{self, Cli};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    cli::dispatch(Cli::parse())
}
