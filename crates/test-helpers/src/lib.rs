// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

mod environment;
mod ledger;
mod relayer;
mod rpc;
mod sdk;
mod wallet;

pub use environment::*;
pub use ledger::*;
pub use relayer::*;
pub use rpc::*;
pub use sdk::*;
pub use wallet::*;
