#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for the quake map.
//!
//! Runs the earthquake query and the risk proxy directly, holds a chat
//! session in the terminal, or starts the API server. Without a subcommand
//! an interactive menu asks which of these to run.

mod chat;
mod report;

use clap::{Parser, Subcommand};
use dialoguer::{Input, Select};
use quake_map_feed::{FeedConfig, UsgsFeed, get_earthquakes, today_utc};
use quake_map_fusion::MapLayers;
use quake_map_quake_models::{DEFAULT_DAYS, DEFAULT_MIN_MAGNITUDE, RawQueryArgs};
use quake_map_risk::{RiskConfig, RiskProxy};

#[derive(Parser)]
#[command(name = "quake_map", about = "Explore recent earthquakes and seismic risk")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Query the USGS feed and print the magnitude tier breakdown
    Query {
        /// Minimum magnitude (clamped to 0-10)
        #[arg(long)]
        min_magnitude: Option<f64>,

        /// Days to look back (clamped to 1-90)
        #[arg(long)]
        days: Option<f64>,

        /// Region filter, e.g. `california`. Unknown regions query worldwide
        #[arg(long)]
        region: Option<String>,
    },

    /// Fetch the risk overlay and report where it came from
    Risk {
        /// Region forwarded to the inference service
        #[arg(long)]
        region: Option<String>,
    },

    /// Chat with the earthquake assistant
    Chat,

    /// Start the API server
    Serve {
        /// Prompt for bind address, port and inference URL first
        #[arg(long, short)]
        interactive: bool,
    },
}

/// Entries of the interactive menu.
enum Tool {
    Query,
    Risk,
    Chat,
    Serve,
}

impl Tool {
    const ALL: &[Self] = &[Self::Query, Self::Risk, Self::Chat, Self::Serve];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Query => "Query recent earthquakes",
            Self::Risk => "Check the risk overlay",
            Self::Chat => "Chat with the assistant",
            Self::Serve => "Start server",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let cli = Cli::parse();
    let command = match cli.command {
        Some(command) => command,
        None => select_command()?,
    };

    match command {
        Commands::Query {
            min_magnitude,
            days,
            region,
        } => {
            let feed = UsgsFeed::new(FeedConfig::from_env())?;
            let args = RawQueryArgs {
                min_magnitude,
                days,
                region,
            };
            let result = get_earthquakes(&feed, args, today_utc()).await?;
            let layers = MapLayers::fuse(&result.features, None);
            print!("{}", report::format_earthquakes(&result.params, &layers));
        }
        Commands::Risk { region } => {
            let proxy = RiskProxy::new(RiskConfig::from_env())?;
            let response = proxy.fetch(region.as_deref()).await;
            print!("{}", report::format_risk(&response));
        }
        Commands::Chat => chat::run().await?,
        Commands::Serve { interactive } => {
            // actix-web brings its own runtime; run it on a blocking thread
            // rather than nesting it inside tokio's.
            tokio::task::spawn_blocking(move || {
                actix_web::rt::System::new().block_on(async move {
                    if interactive {
                        quake_map_server::interactive::run().await
                    } else {
                        quake_map_server::run_server().await
                    }
                })
            })
            .await??;
        }
    }

    Ok(())
}

/// Asks which tool to run, then prompts for that tool's arguments.
fn select_command() -> Result<Commands, dialoguer::Error> {
    println!("Quake Map");
    println!();

    let labels: Vec<&str> = Tool::ALL.iter().map(Tool::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    Ok(match Tool::ALL[idx] {
        Tool::Query => Commands::Query {
            min_magnitude: prompt_number("Minimum magnitude", DEFAULT_MIN_MAGNITUDE)?,
            days: prompt_number("Days to look back", f64::from(DEFAULT_DAYS))?,
            region: prompt_optional("Region (blank for worldwide)")?,
        },
        Tool::Risk => Commands::Risk {
            region: prompt_optional("Region (blank for the default)")?,
        },
        Tool::Chat => Commands::Chat,
        Tool::Serve => Commands::Serve { interactive: true },
    })
}

fn prompt_number(label: &str, default: f64) -> Result<Option<f64>, dialoguer::Error> {
    let answer: String = Input::new()
        .with_prompt(label)
        .default(default.to_string())
        .interact_text()?;
    Ok(answer.trim().parse().ok())
}

fn prompt_optional(label: &str) -> Result<Option<String>, dialoguer::Error> {
    let answer: String = Input::new()
        .with_prompt(label)
        .allow_empty(true)
        .interact_text()?;
    let answer = answer.trim();
    Ok((!answer.is_empty()).then(|| answer.to_string()))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn query_flags_map_to_raw_arguments() {
        let cli = Cli::try_parse_from([
            "quake_map",
            "query",
            "--min-magnitude",
            "4.5",
            "--days",
            "30",
            "--region",
            "California",
        ])
        .unwrap();

        let Some(Commands::Query {
            min_magnitude,
            days,
            region,
        }) = cli.command
        else {
            panic!("expected query");
        };
        assert_eq!(min_magnitude, Some(4.5));
        assert_eq!(days, Some(30.0));
        assert_eq!(region.as_deref(), Some("California"));
    }

    #[test]
    fn no_subcommand_falls_back_to_menu() {
        let cli = Cli::try_parse_from(["quake_map"]).unwrap();
        assert!(cli.command.is_none());
    }
}
