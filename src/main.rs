use clap::Parser;

use scan_relay::cli::{self, Args, Command, LogLevel};
use scan_relay::config::Config;

/// Install the logger. `--log-level` wins over the config file, which wins over RUST_LOG.
fn init_logger(cli_level: Option<LogLevel>, config_level: Option<&str>) {
    let mut builder = match (cli_level, config_level) {
        (Some(level), _) => {
            let mut builder = env_logger::Builder::new();
            builder.filter_level(level.into());
            builder
        }
        (None, Some(filters)) => {
            let mut builder = env_logger::Builder::new();
            builder.parse_filters(filters);
            builder
        }
        (None, None) => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        }
    };
    builder.format_timestamp_millis().init();
}

fn run(args: Args, config: Config) -> Result<(), String> {
    match args.command {
        Command::Sync => cli::sync(&config),
        Command::Count => cli::count(&config),
        Command::Info => cli::info(&config),
        Command::Search { image } => cli::search(&config, &image),
        Command::Match { image, uid } => cli::match_uid(&config, &image, &uid),
        Command::ApiSearch { image } => cli::api_search(&config, &image),
        Command::Decode { image, formats } => cli::decode(&config, &image, formats),
        Command::Scan {
            source,
            manual,
            fps,
        } => cli::scan(&config, source, manual, fps),
        Command::Config { action } => {
            cli::handle_config_action(action, &config, args.config.as_deref());
            Ok(())
        }
    }
}

fn main() {
    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(db) = &args.db {
        config.engine.db_path = Some(db.clone());
    }

    init_logger(args.log_level, config.log_level.as_deref());
    log::debug!("Using database {}", config.engine.db_path().display());

    if let Err(e) = cli::setup_ctrlc_handler() {
        log::warn!("Could not install Ctrl+C handler: {}", e);
    }

    if let Err(e) = run(args, config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
