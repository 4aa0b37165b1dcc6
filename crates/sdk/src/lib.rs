// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

mod holder;
mod rating;
mod stats;

pub use fherate_config as config;
pub use fherate_evm_helpers as evm_helpers;
pub use fherate_fhevm as fhevm;

pub use holder::*;
pub use rating::*;
pub use stats::*;

use fherate_fhevm::FhevmError;

/// True when `report` is an intentional cancellation that should not be
/// shown to the user.
pub fn is_cancelled(report: &eyre::Report) -> bool {
    report
        .downcast_ref::<FhevmError>()
        .is_some_and(FhevmError::is_aborted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_cancelled() {
        assert!(is_cancelled(&eyre::Report::new(FhevmError::Aborted)));
        assert!(!is_cancelled(&eyre::Report::new(FhevmError::EmptyInput)));
        assert!(!is_cancelled(&eyre::eyre!("ActivityEnded")));
    }
}
