//! DevIns CLI
//!
//! Compile, validate and inspect DevIns instruction documents from the
//! command line.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// DevIns - instruction compiler for AI agents
#[derive(Parser)]
#[command(name = "devins")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "devins.yaml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new DevIns project
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Project name (defaults to directory name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Compile an instruction file and print the result
    Compile {
        /// Instruction file
        file: String,

        /// Variable binding, repeatable (`name=value`, JSON values allowed)
        #[arg(long = "var", value_name = "NAME=VALUE", value_parser = commands::compile::parse_var)]
        vars: Vec<(String, serde_json::Value)>,

        /// Skip the `$name` substitution pass
        #[arg(long)]
        raw: bool,

        /// Fail on unresolved variables and processor errors
        #[arg(long)]
        strict: bool,

        /// Record extra detail in warnings and logs
        #[arg(long)]
        debug: bool,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check configuration and, optionally, an instruction file
    Validate {
        /// Instruction file to check
        file: Option<String>,
    },

    /// Print the parsed document as JSON
    Parse {
        /// Instruction file
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // stdout carries compiled output
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init { path, name } => {
            commands::init::run(&path, name.as_deref()).await?;
        }
        Commands::Compile {
            file,
            vars,
            raw,
            strict,
            debug,
            json,
        } => {
            let flags = commands::compile::Flags {
                raw,
                strict,
                debug,
                json,
            };
            commands::compile::run(&cli.config, &file, vars, flags).await?;
        }
        Commands::Validate { file } => {
            commands::validate::run(&cli.config, file.as_deref()).await?;
        }
        Commands::Parse { file } => {
            commands::parse::run(&file).await?;
        }
    }

    Ok(())
}
