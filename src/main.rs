use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sandboxfs::cli::{self, Cli, Commands};
use sandboxfs::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // `config` subcommands load (or create) the file themselves, so a broken
    // file must not stop `config init --force`.
    let loaded = Config::load(cli.config.as_deref());
    init_logging(cli.verbose, loaded.as_ref().ok());

    match cli.command {
        Commands::Config(args) => cli::config::run(args, cli.config.as_deref()),
        Commands::Check(args) => cli::check::run(args, &loaded?).await,
        Commands::Call(args) => cli::call::run(args, &loaded?),
        Commands::Resolve(args) => cli::resolve::run(args, &loaded?),
        Commands::Schema => cli::schema::run(),
    }
}

/// RUST_LOG wins, then --verbose, then `logging.level` from the config.
fn init_logging(verbose: bool, config: Option<&Config>) {
    let log_level = if verbose {
        "debug"
    } else {
        config.map(|c| c.logging.level.as_str()).unwrap_or("info")
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.is_some_and(|c| c.logging.format == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}
