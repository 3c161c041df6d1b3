// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared::sector::StoragePower;

/// Governance parameters supplied to actors by the embedding system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Minimum size of a verified deal, and the floor below which a verified
    /// client entry is not retained.
    pub minimum_verified_deal_size: StoragePower,
}

impl Default for Policy {
    fn default() -> Policy {
        Policy {
            minimum_verified_deal_size: StoragePower::from(
                policy_constants::MINIMUM_VERIFIED_DEAL_SIZE,
            ),
        }
    }
}

pub mod policy_constants {
    /// 1 MiB
    pub const MINIMUM_VERIFIED_DEAL_SIZE: i64 = 1 << 20;
}
