use anyhow::Result;
use clap::Parser;
use rebound_engine::Config;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "rebound", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Classify a remote-call failure
    ///
    /// Builds the failure the way a client would have raised it, normalizes it
    /// into an error descriptor and prints:
    ///
    /// - status code, error code and message
    /// - category and suggested remediation
    /// - whether a read or a delete should retry it
    ///
    /// Transport failures (--transport) have no HTTP status of their own; one
    /// is derived from the message (timeouts become 504, connection problems
    /// 503, anything else 400).
    Classify(commands::classify::ClassifyArgs),

    /// Run a bulk operation against a simulated remote
    ///
    /// Every ID is processed concurrently. Items succeed unless named with
    /// --fail (answer with the given status and code) or --panic (crash the
    /// action). Progress is printed as items finish, followed by the verdict.
    ///
    /// Exits non-zero when every item failed and partial failures are not
    /// being ignored. Ctrl-C cancels the batch and reports what finished.
    Simulate(commands::simulate::SimulateArgs),

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, clap::Subcommand)]
enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Print one config value
    Get {
        /// Config key, e.g. max_concurrency
        key: String,
    },
    /// Print the config file path
    Path,
    /// Print an example config file
    Example,
    /// Create the config file with defaults if it does not exist
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Classify(args) => commands::run_classify(&args)?,
        Commands::Simulate(args) => commands::run_simulate(args, &config).await?,
        Commands::Config { command } => match command {
            ConfigCommand::Show => commands::config::show_config(&config),
            ConfigCommand::Get { key } => commands::config::get_config(&config, &key)?,
            ConfigCommand::Path => commands::config::show_path(),
            ConfigCommand::Example => commands::config::show_example(),
            ConfigCommand::Init => commands::config::init_config()?,
        },
    }

    Ok(())
}
