// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Client side of the encrypted rating protocol: network resolution, session
//! bootstrap, encrypted inputs and decryption authorization.

mod abort;
mod codec;
mod decrypt;
mod eip712;
mod error;
mod factory;
mod handle;
mod input;
mod instance;
mod network;
mod relayer;
mod resolver;
mod rpc;
mod sdk;
mod signature;
mod state;
mod storage;
mod wallet;

pub use abort::*;
pub use codec::*;
pub use decrypt::*;
pub use eip712::*;
pub use error::*;
pub use factory::*;
pub use handle::*;
pub use input::*;
pub use instance::*;
pub use network::*;
pub use relayer::*;
pub use resolver::*;
pub use rpc::*;
pub use sdk::*;
pub use signature::*;
pub use state::*;
pub use storage::*;
pub use wallet::*;
