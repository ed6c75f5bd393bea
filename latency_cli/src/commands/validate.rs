use crate::ui;
use anyhow::Result;
use latency_session::parse_config_from_file;
use std::path::PathBuf;

pub async fn execute(config_file: PathBuf) -> Result<()> {
    ui::print_header("Validating Config");
    println!("File: {}", config_file.display());

    match parse_config_from_file(&config_file).await {
        Ok(config) => {
            ui::print_success("Config is valid!");
            println!("\nEngine Settings:");
            println!("  Store: {}", config.store_path.display());
            println!("  Schemes: {}", config.schemes.join(", "));
            println!(
                "  Retry: {} attempts, {:?}..{:?}",
                config.retry.max_attempts, config.retry.base_delay, config.retry.max_delay
            );

            if config.reaper.is_enabled() {
                println!(
                    "  Reaper: evict after {:?}, every {:?}",
                    config.reaper.max_age, config.reaper.interval
                );
            } else {
                ui::print_warning("Reaper disabled; lost completions will leak in-flight entries");
            }

            Ok(())
        }
        Err(e) => {
            ui::print_error("Config is invalid!");
            println!("\nError: {}", e);
            Err(e)
        }
    }
}
