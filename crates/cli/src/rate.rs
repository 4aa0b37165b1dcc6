// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use alloy::primitives::U256;
use anyhow::Result;

use crate::context::ClientContext;
use crate::helpers::from_report;

pub async fn execute(ctx: &ClientContext, id: u64, scores: Vec<u32>) -> Result<()> {
    let client = ctx.client().await?;
    let tx = client
        .submit_rating(U256::from(id), &scores)
        .await
        .map_err(from_report)?;
    println!("Rated activity {} in {}", id, tx);
    Ok(())
}
