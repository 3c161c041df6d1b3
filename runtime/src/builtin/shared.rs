// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use anyhow::{anyhow, Context};
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::METHOD_SEND;
use num_traits::Zero;

use crate::runtime::Runtime;

pub const HAMT_BIT_WIDTH: u32 = 5;

/// Resolves an address to its canonical ID form.
/// If no actor yet exists for the address, a zero-value message is sent to it so the
/// system creates an account for it, and resolution is attempted once more.
pub fn resolve_to_id_addr<BS, RT>(rt: &mut RT, address: &Address) -> anyhow::Result<Address>
where
    BS: Blockstore,
    RT: Runtime<BS>,
{
    // if we are able to resolve it to an ID address, return the resolved address
    if let Some(addr) = rt.resolve_address(address) {
        return Ok(addr);
    }

    // send 0 balance to the account so an ID address for it is created and then try to resolve
    rt.send(*address, METHOD_SEND, RawBytes::default(), TokenAmount::zero())
        .with_context(|| format!("failed to send zero balance to address {}", address))?;

    rt.resolve_address(address).ok_or_else(|| anyhow!("failed to resolve address {}", address))
}
