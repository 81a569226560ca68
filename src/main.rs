//! Neighborhood intelligence CLI and tool server

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;

use neighborhood_intel::{
    IntelConfig, IntelService, IntentHints, ToolTarget, VERSION, telemetry, web,
};

#[derive(Parser)]
#[command(name = "neighborhood-intel")]
#[command(about = "Assemble, compare and evaluate neighborhood data", long_about = None)]
#[command(version = VERSION)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, env = "NEIGHBORHOOD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP tool server
    Serve {
        /// Overrides server.port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Full context and AI evaluation for one location
    Evaluate {
        /// Address, or "lat,lon"
        query: String,

        #[arg(long)]
        goals: Option<String>,

        /// Limit sources to these fields or tools
        #[arg(long, value_delimiter = ',')]
        hints: Vec<String>,
    },

    /// Compare and rank several locations
    Compare {
        #[arg(required = true, num_args = 2..)]
        queries: Vec<String>,

        #[arg(long)]
        goals: Option<String>,

        #[arg(long, value_delimiter = ',')]
        hints: Vec<String>,

        /// Skip the comparative narrative
        #[arg(long)]
        no_analysis: bool,
    },

    /// Call a single tool
    Fetch {
        /// Tool name (weather, housing, crime_data, ...)
        tool: String,

        /// Address, or "lat,lon"
        query: String,

        /// Tool option as key=value, repeatable
        #[arg(short, long = "option", value_parser = parse_option)]
        options: Vec<(String, String)>,
    },

    /// List available tools
    Tools,
}

fn parse_option(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).with_context(|| "Failed to encode output")?;
    println!("{text}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = IntelConfig::load_from_path(cli.config)?;
    telemetry::init_tracing(&config.logging)?;

    if let Commands::Tools = cli.command {
        return print_json(&IntelService::list_tools());
    }

    let service = IntelService::from_config(&config)?;

    match cli.command {
        Commands::Serve { port } => {
            web::run(service, port.unwrap_or(config.server.port)).await?;
        }
        Commands::Evaluate {
            query,
            goals,
            hints,
        } => {
            let evaluation = service
                .evaluate(&query, goals.as_deref(), &IntentHints::from_names(&hints))
                .await
                .map_err(|e| anyhow!(e.user_message()))?;
            print_json(&evaluation)?;
        }
        Commands::Compare {
            queries,
            goals,
            hints,
            no_analysis,
        } => {
            let comparison = service
                .compare(
                    &queries,
                    goals.as_deref(),
                    &IntentHints::from_names(&hints),
                    !no_analysis,
                )
                .await
                .map_err(|e| anyhow!(e.user_message()))?;
            print_json(&comparison)?;
        }
        Commands::Fetch {
            tool,
            query,
            options,
        } => {
            let options: BTreeMap<String, String> = options.into_iter().collect();
            let output = service
                .run_tool(&tool, &ToolTarget::Query(query), options)
                .await
                .map_err(|e| anyhow!(e.user_message()))?;
            print_json(&output)?;
        }
        Commands::Tools => {}
    }

    Ok(())
}
