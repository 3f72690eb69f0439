//! Command line front end of the rom catalog

use clap::Parser;
use cli::{handle_cli, Cli};

mod cli;

fn main() {
    tracing_subscriber::fmt::init();
    tracing::info!("nds-catalog v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    if let Err(err) = handle_cli(cli) {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}
