// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::Result;
use fherate_fhevm::AbortController;
use tracing::debug;

use crate::context::ClientContext;

/// Create a session, printing each state as it is reached. Ctrl-C cancels.
pub async fn execute(ctx: &ClientContext) -> Result<()> {
    let factory = ctx.factory();
    let target = ctx.target().await?;

    let controller = AbortController::new();
    let interrupt = tokio::spawn({
        let controller = controller.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupted, cancelling session creation");
                controller.abort();
            }
        }
    });

    let mut task = factory.start(target, controller.signal());
    while let Some(state) = task.updates.recv().await {
        println!("{}", state);
    }
    let result = task.wait().await;
    interrupt.abort();

    match result {
        Ok(session) => {
            println!("{}", serde_json::to_string_pretty(session.descriptor())?);
            println!("{}", serde_json::to_string_pretty(session.config())?);
            Ok(())
        }
        Err(e) if e.is_aborted() => {
            eprintln!("Cancelled");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
