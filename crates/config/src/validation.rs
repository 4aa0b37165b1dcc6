// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::str::FromStr;

use alloy_primitives::Address;

use crate::rpc::RpcEndpoint;

/// Clap value parser for JSON-RPC endpoints
#[derive(Clone, Debug)]
pub struct ValidUrl(RpcEndpoint);

impl FromStr for ValidUrl {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ValidUrl(RpcEndpoint::from_url(s)?))
    }
}

impl From<ValidUrl> for RpcEndpoint {
    fn from(value: ValidUrl) -> Self {
        value.0
    }
}

/// Clap value parser for checksummed or lowercase hex addresses
#[derive(Clone, Copy, Debug)]
pub struct ValidAddress(Address);

impl FromStr for ValidAddress {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ValidAddress(Address::from_str(s.trim())?))
    }
}

impl From<ValidAddress> for Address {
    fn from(value: ValidAddress) -> Self {
        value.0
    }
}
