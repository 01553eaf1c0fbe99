use anyhow::Result;
use rebound_engine::{config, Config};

const KEYS: &str = "max_concurrency, batch_timeout_secs, ignore_partial_failures, \
                    read_timeout_secs, min_backoff_ms, max_backoff_ms, log_level";

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| String::from("<not set>"), |v| v.to_string())
}

/// Show the current effective configuration.
pub fn show_config(config: &Config) {
    let config_path = config::config_file_path();

    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config_path.display());
    let exists = config_path.exists();
    println!(
        "File exists: {}\n",
        if exists { "yes" } else { "no (using defaults)" }
    );

    println!("Settings:");
    println!("  max_concurrency: {}", optional(config.max_concurrency));
    println!("  batch_timeout_secs: {}", optional(config.batch_timeout_secs));
    println!("  ignore_partial_failures: {}", config.ignore_partial_failures);
    println!("  read_timeout_secs: {}", config.read_timeout_secs);
    println!("  min_backoff_ms: {}", config.min_backoff_ms);
    println!("  max_backoff_ms: {}", config.max_backoff_ms);
    println!("  log_level: {}", config.log_level);

    println!("\nPriority: CLI args > ENV vars (REBOUND_*) > Config file > Defaults");
}

/// Print a single config value.
pub fn get_config(config: &Config, key: &str) -> Result<()> {
    let value = match key {
        "max_concurrency" => optional(config.max_concurrency),
        "batch_timeout_secs" => optional(config.batch_timeout_secs),
        "ignore_partial_failures" => config.ignore_partial_failures.to_string(),
        "read_timeout_secs" => config.read_timeout_secs.to_string(),
        "min_backoff_ms" => config.min_backoff_ms.to_string(),
        "max_backoff_ms" => config.max_backoff_ms.to_string(),
        "log_level" => config.log_level.clone(),
        _ => anyhow::bail!("Unknown config key: {}\n\nValid keys: {}", key, KEYS),
    };
    println!("{}", value);
    Ok(())
}

/// Show the config file path.
pub fn show_path() {
    println!("{}", config::config_file_path().display());
}

/// Show example configuration.
pub fn show_example() {
    print!("{}", config::example_config());
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to configure rebound.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}
