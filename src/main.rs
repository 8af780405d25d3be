use color_eyre::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use wkr::{Config, Database, Profile, cli::{self, Cli, Commands}, config::default_data_dir, utils::expand_path};

/// Open the current workspace's store, migrating a legacy one first
fn open_store(config: &Config) -> Result<Database> {
    Ok(Database::open(&config.get_database_path()?, &config.store_options())?)
}

fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Tui);

    // The TUI owns the screen, so it only gets warnings unless RUST_LOG says otherwise
    let default_level = if matches!(command, Commands::Tui) { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Determine profile: --dev flag enables dev mode, otherwise use prod
    let profile = if cli.dev {
        Profile::Dev
    } else {
        Profile::Prod
    };

    let config_path = match cli.config.as_deref() {
        Some(path) => expand_path(path),
        None => Config::get_config_path(profile)?,
    };
    let mut config = Config::load_from(&config_path, &default_data_dir(profile))?;

    match command {
        Commands::Tui => {
            let db = open_store(&config)?;
            let app = wkr::tui::App::new(config, config_path, db)?;
            wkr::tui::run_event_loop(app)?;
        }
        // Workspace management only touches the config file
        Commands::Workspace(command) => cli::handle_workspace(command, &mut config, &config_path)?,
        Commands::Week => cli::handle_week(&open_store(&config)?, &config)?,
        Commands::Category(command) => cli::handle_category(command, &open_store(&config)?)?,
        Commands::Project(command) => cli::handle_project(command, &open_store(&config)?)?,
        Commands::Task(command) => cli::handle_task(command, &open_store(&config)?)?,
        Commands::Log(command) => cli::handle_log(command, &open_store(&config)?)?,
        Commands::Rollover { from, to, dry_run, yes } => {
            cli::handle_rollover(from, to, dry_run, yes, &open_store(&config)?)?;
        }
        Commands::Report { year, week, json, copy, output } => {
            let db = open_store(&config)?;
            cli::handle_report(year, week, json, copy, output, &db, &config)?;
        }
    }

    Ok(())
}
