// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::path::PathBuf;

use anyhow::Result;
use clap::{command, ArgAction, Parser, Subcommand};
use fherate_config::validation::ValidUrl;
use fherate_config::{load_config, FheRateConfig};
use tracing::{info, instrument, Level};

use crate::activity::{self, ActivityCommands};
use crate::context::ClientContext;
use crate::helpers::telemetry::setup_tracing;
use crate::{network, rate, session, stats};

#[derive(Parser, Debug)]
#[command(name = "fherate")]
#[command(about = "A CLI for running rating activities whose scores stay encrypted on chain", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// JSON-RPC endpoint of the chain to talk to. Overrides `rpc_url` from the config
    #[arg(long = "rpc-url", global = true)]
    rpc_url: Option<ValidUrl>,

    #[command(subcommand)]
    command: Commands,

    /// Indicate error levels by adding additional `-v` arguments. Eg. `fherate -vvv` will give you
    /// trace level output
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true
    )]
    pub verbose: u8,

    /// Silence all output. This argument cannot be used alongside `-v`
    #[arg(
        short,
        long,
        action = ArgAction::SetTrue,
        conflicts_with = "verbose",
        global = true
    )]
    quiet: bool,
}

impl Cli {
    pub fn log_level(&self) -> Level {
        if self.quiet {
            Level::ERROR
        } else {
            match self.verbose {
                0 => Level::WARN,  //
                1 => Level::INFO,  // -v
                2 => Level::DEBUG, // -vv
                _ => Level::TRACE, // -vvv
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn execute(self) -> Result<()> {
        setup_tracing(self.log_level());
        let config = self.load_config()?;
        info!("Config loaded from: {:?}", config.config_file());

        let ctx = ClientContext::new(config)?;
        match self.command {
            Commands::Network => network::execute(&ctx).await?,
            Commands::Session => session::execute(&ctx).await?,
            Commands::Activity { command } => activity::execute(command, &ctx).await?,
            Commands::Rate { id, scores } => rate::execute(&ctx, id, scores).await?,
            Commands::Stats { id, json } => stats::execute(&ctx, id, json).await?,
        }

        Ok(())
    }

    pub fn load_config(&self) -> Result<FheRateConfig> {
        let mut config = load_config(self.config.clone())?;
        if let Some(rpc_url) = self.rpc_url.clone() {
            config.rpc_url = Some(rpc_url.into());
        }
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect whether the RPC endpoint is a local mock network or production
    Network,

    /// Create an encrypted session and print every state it goes through
    Session,

    /// Create, inspect and close rating activities
    Activity {
        #[command(subcommand)]
        command: ActivityCommands,
    },

    /// Submit an encrypted rating, one score per dimension
    Rate {
        /// Activity id
        id: u64,

        /// Score for the next dimension, in dimension order
        #[arg(long = "score", short = 's', required = true)]
        scores: Vec<u32>,
    },

    /// Decrypt an activity's ratings and print per dimension statistics
    Stats {
        /// Activity id
        id: u64,

        /// Print the statistics as JSON
        #[arg(long)]
        json: bool,
    },
}
