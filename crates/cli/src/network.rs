// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::Result;
use fherate_fhevm::{NetworkProfile, ProviderOrUrl};

use crate::context::ClientContext;

pub async fn execute(ctx: &ClientContext) -> Result<()> {
    let factory = ctx.factory();
    let profile = factory
        .resolver()
        .resolve(&ProviderOrUrl::Url(ctx.rpc.clone()))
        .await?;

    println!("{}", serde_json::to_string_pretty(&profile.descriptor())?);
    match &profile {
        NetworkProfile::Mock { authorities, .. } => {
            println!("ACL:            {}", authorities.acl);
            println!("Input verifier: {}", authorities.input_verifier);
            println!("KMS verifier:   {}", authorities.kms_verifier);
        }
        NetworkProfile::Production { .. } => {
            println!("Relayer:        {}", ctx.config.production.relayer_url);
            println!("ACL:            {}", ctx.config.production.acl_contract_address);
        }
    }
    Ok(())
}
