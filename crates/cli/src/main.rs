//! Lotline CLI, the main entry point.
//!
//! Commands:
//! - `init`     writes a starter config file
//! - `chat`     interactive Q&A or single-question mode
//! - `dataset`  loads the master table and prints the load report
//! - `status`   shows configuration and dataset health

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "lotline",
    about = "Production Q&A over the plant's master table",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter lotline.toml in the current directory
    Init,

    /// Ask questions about the production dataset
    Chat {
        /// Ask a single question instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Restrict the data payload to these years (comma-separated)
        #[arg(long, value_delimiter = ',', conflicts_with = "head")]
        years: Option<Vec<i32>>,

        /// Send the first N rows as a CSV block instead of per-year JSON
        #[arg(long)]
        head: Option<usize>,
    },

    /// Load the dataset and print the load report
    Dataset,

    /// Show configuration and dataset health
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Chat {
            message,
            years,
            head,
        } => commands::chat::run(message, years, head).await?,
        Commands::Dataset => commands::dataset::run().await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn chat_years_are_comma_separated() {
        let cli = Cli::try_parse_from(["lotline", "chat", "--years", "2023,2024"]).unwrap();
        match cli.command {
            Commands::Chat { years, .. } => assert_eq!(years, Some(vec![2023, 2024])),
            _ => panic!("Expected chat subcommand"),
        }
    }

    #[test]
    fn chat_years_and_head_conflict() {
        let result =
            Cli::try_parse_from(["lotline", "chat", "--years", "2024", "--head", "10"]);
        assert!(result.is_err());
    }

    #[test]
    fn verbose_flag_is_global() {
        let cli = Cli::try_parse_from(["lotline", "status", "--verbose"]).unwrap();
        assert!(cli.verbose);
    }
}
