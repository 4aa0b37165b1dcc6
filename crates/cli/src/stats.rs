// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use alloy::primitives::U256;
use anyhow::Result;
use fherate_fhevm::AbortController;
use fherate_sdk::{is_cancelled, ActivityStatistics, DecryptionProgress};
use tokio::sync::mpsc;
use tracing::debug;

use crate::context::ClientContext;
use crate::helpers::from_report;

/// Decrypt and summarize an activity's ratings. Ctrl-C cancels.
pub async fn execute(ctx: &ClientContext, id: u64, json: bool) -> Result<()> {
    let client = ctx.client().await?;

    let controller = AbortController::new();
    let interrupt = tokio::spawn({
        let controller = controller.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupted, cancelling decryption");
                controller.abort();
            }
        }
    });

    let (sender, mut progress) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(step) = progress.recv().await {
            match step {
                DecryptionProgress::FetchingHandles => eprintln!("Fetching encrypted ratings..."),
                DecryptionProgress::AwaitingAuthorization => {
                    eprintln!("Authorizing decryption...")
                }
                DecryptionProgress::Decrypting => eprintln!("Decrypting..."),
                DecryptionProgress::Done => {}
            }
        }
    });

    let result = client
        .statistics(U256::from(id), &controller.signal(), Some(&sender))
        .await;
    interrupt.abort();
    drop(sender);
    // the printer ends once the sender is gone
    let _ = printer.await;

    let (activity, stats) = match result {
        Ok(found) => found,
        Err(report) if is_cancelled(&report) => {
            eprintln!("Cancelled");
            return Ok(());
        }
        Err(report) => return Err(from_report(report)),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("{} ({} ratings)", activity.title, stats.total_ratings);
    print_table(&stats, activity.scale);
    Ok(())
}

fn print_table(stats: &ActivityStatistics, scale: u8) {
    let dash = |v: Option<u64>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
    for dimension in &stats.dimensions {
        println!(
            "  {:<20} avg {:>5.2}/{}  min {:>3}  max {:>3}",
            dimension.dimension,
            dimension.average,
            scale,
            dash(dimension.min),
            dash(dimension.max)
        );
        for (score, count) in &dimension.distribution {
            println!("      {:>3}: {}", score, "#".repeat(*count));
        }
    }
}
