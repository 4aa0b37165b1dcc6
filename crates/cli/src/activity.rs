// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use alloy::primitives::{Address, U256};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use fherate_config::validation::ValidAddress;
use fherate_evm_helpers::{ActivityInfo, NewActivity, RatingLedgerRead, RatingLedgerWrite};

use crate::context::ClientContext;
use crate::helpers::from_report;

#[derive(Subcommand, Debug)]
pub enum ActivityCommands {
    /// Create a rating activity
    Create {
        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        /// A dimension raters score, repeat for each one
        #[arg(long = "dimension", short = 'd', required = true)]
        dimensions: Vec<String>,

        /// Highest score a rater may give
        #[arg(long, default_value_t = 10)]
        scale: u8,

        /// How long the activity accepts ratings
        #[arg(long = "duration-hours", default_value_t = 168)]
        duration_hours: u64,

        /// Let a rater submit more than once
        #[arg(long = "allow-multiple")]
        allow_multiple: bool,

        #[arg(long = "cover-image-url", default_value = "")]
        cover_image_url: String,
    },
    /// Print an activity
    Show { id: u64 },
    /// Stop accepting ratings. Only the creator can close an activity
    Close { id: u64 },
    /// List activities, optionally filtered by creator or participant
    List {
        #[arg(long, conflicts_with = "participant")]
        creator: Option<ValidAddress>,

        #[arg(long)]
        participant: Option<ValidAddress>,
    },
}

pub async fn execute(command: ActivityCommands, ctx: &ClientContext) -> Result<()> {
    match command {
        ActivityCommands::Create {
            title,
            description,
            dimensions,
            scale,
            duration_hours,
            allow_multiple,
            cover_image_url,
        } => {
            if scale == 0 {
                bail!("scale must be at least 1");
            }
            let end_time = Utc::now().timestamp().max(0) as u64 + duration_hours * 3600;
            let ledger = ctx.write_ledger().await?;
            let id = ledger
                .create_activity(NewActivity {
                    title,
                    description,
                    cover_image_url,
                    dimensions,
                    scale,
                    end_time,
                    allow_multiple,
                })
                .await
                .map_err(from_report)?;
            println!("Created activity {}", id);
        }
        ActivityCommands::Show { id } => {
            let ledger = ctx.read_ledger().await?;
            let activity = ledger
                .get_activity(U256::from(id))
                .await
                .map_err(from_report)?;
            print_activity(&activity);
        }
        ActivityCommands::Close { id } => {
            let ledger = ctx.write_ledger().await?;
            let tx = ledger
                .close_activity(U256::from(id))
                .await
                .map_err(from_report)?;
            println!("Closed activity {} in {}", id, tx);
        }
        ActivityCommands::List {
            creator,
            participant,
        } => {
            let ledger = ctx.read_ledger().await?;
            let ids = list_ids(&ledger, creator.map(Address::from), participant.map(Address::from))
                .await
                .map_err(from_report)?;
            for id in ids {
                let activity = ledger.get_activity(id).await.map_err(from_report)?;
                println!(
                    "{:>4}  {:<32}  {:>3} raters  {}",
                    activity.id,
                    activity.title,
                    activity.participant_count,
                    status(&activity)
                );
            }
        }
    }

    Ok(())
}

async fn list_ids(
    ledger: &impl RatingLedgerRead,
    creator: Option<Address>,
    participant: Option<Address>,
) -> eyre::Result<Vec<U256>> {
    if let Some(creator) = creator {
        return ledger.get_creator_activities(creator).await;
    }
    if let Some(participant) = participant {
        return ledger.get_participant_activities(participant).await;
    }
    let count: u64 = ledger.get_activity_count().await?.saturating_to();
    Ok((0..count).map(U256::from).collect())
}

fn status(activity: &ActivityInfo) -> &'static str {
    let now = Utc::now().timestamp().max(0) as u64;
    if activity.active && now < activity.end_time {
        "active"
    } else {
        "ended"
    }
}

fn format_time(secs: u64) -> String {
    DateTime::<Utc>::from_timestamp(secs as i64, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

fn print_activity(activity: &ActivityInfo) {
    println!("Activity {}: {}", activity.id, activity.title);
    if !activity.description.is_empty() {
        println!("  {}", activity.description);
    }
    println!("  Creator:     {}", activity.creator);
    println!("  Dimensions:  {}", activity.dimensions.join(", "));
    println!("  Scale:       1-{}", activity.scale);
    println!("  Raters:      {}", activity.participant_count);
    println!("  Multiple:    {}", activity.allow_multiple);
    println!("  Created:     {}", format_time(activity.created_at));
    println!("  Ends:        {}", format_time(activity.end_time));
    println!("  Status:      {}", status(activity));
}
