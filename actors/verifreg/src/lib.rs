// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::error::ExitCode;
use fvm_shared::{MethodNum, METHOD_CONSTRUCTOR};
use log::info;
use num_derive::FromPrimitive;
use num_traits::{FromPrimitive, Signed};

use fil_actors_runtime::cbor;
use fil_actors_runtime::runtime::{ActorCode, Runtime};
use fil_actors_runtime::{
    actor_error, resolve_to_id_addr, ActorContext, ActorError, AsActorError,
    STORAGE_MARKET_ACTOR_ADDR, SYSTEM_ACTOR_ADDR,
};

pub use self::state::State;
pub use self::types::*;

mod state;
pub mod testing;
mod types;

/// Registry actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    AddVerifier = 2,
    RemoveVerifier = 3,
    AddVerifiedClient = 4,
    UseBytes = 5,
    RestoreBytes = 6,
}

pub struct Actor;

impl Actor {
    /// Constructor for Registry Actor
    pub fn constructor<BS, RT>(rt: &mut RT, root_key: Address) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        rt.validate_immediate_caller_is(std::iter::once(&SYSTEM_ACTOR_ADDR))?;

        // root should be an ID address
        let id_addr = rt
            .resolve_address(&root_key)
            .context_code(ExitCode::USR_ILLEGAL_ARGUMENT, "root should be an ID address")?;

        let st = State::new(rt.store(), id_addr).context("failed to create verifreg state")?;

        rt.create(&st)?;
        Ok(())
    }

    pub fn add_verifier<BS, RT>(rt: &mut RT, params: AddVerifierParams) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        if params.allowance < rt.policy().minimum_verified_deal_size {
            return Err(actor_error!(
                illegal_argument,
                "allowance {} below minimum deal size for add verifier {}",
                params.allowance,
                params.address
            ));
        }

        let verifier = resolve_to_id_addr(rt, &params.address).context_code(
            ExitCode::USR_ILLEGAL_STATE,
            format!("failed to resolve addr {} to ID addr", params.address),
        )?;

        let st: State = rt.state()?;
        rt.validate_immediate_caller_is(std::iter::once(&st.root_key))?;

        // Disallow root as a verifier.
        if verifier == st.root_key {
            return Err(actor_error!(illegal_argument, "root key cannot be added as verifier"));
        }

        rt.transaction(|st: &mut State, rt| {
            // A verified client cannot become a verifier.
            if st.get_verified_client_cap(rt.store(), &verifier)?.is_some() {
                return Err(actor_error!(
                    illegal_argument,
                    "verified client {} cannot become a verifier",
                    verifier
                ));
            }

            // Store the new verifier and allowance (over-writing).
            st.put_verifier(rt.store(), &verifier, &params.allowance)
                .context("failed to add verifier")
        })
    }

    pub fn remove_verifier<BS, RT>(rt: &mut RT, verifier_addr: Address) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        let verifier = resolve_to_id_addr(rt, &verifier_addr).context_code(
            ExitCode::USR_ILLEGAL_STATE,
            format!("failed to resolve addr {} to ID addr", verifier_addr),
        )?;

        let st: State = rt.state()?;
        rt.validate_immediate_caller_is(std::iter::once(&st.root_key))?;

        rt.transaction(|st: &mut State, rt| {
            st.remove_verifier(rt.store(), &verifier).context("failed to remove verifier")
        })
    }

    pub fn add_verified_client<BS, RT>(
        rt: &mut RT,
        params: AddVerifierClientParams,
    ) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        // The caller will be verified by checking the verifiers table below.
        rt.validate_immediate_caller_accept_any()?;

        if params.allowance < rt.policy().minimum_verified_deal_size {
            return Err(actor_error!(
                illegal_argument,
                "allowance {} below minimum deal size for add verified client {}",
                params.allowance,
                params.address
            ));
        }

        let client = resolve_to_id_addr(rt, &params.address).context_code(
            ExitCode::USR_ILLEGAL_STATE,
            format!("failed to resolve addr {} to ID addr", params.address),
        )?;

        let st: State = rt.state()?;
        if client == st.root_key {
            return Err(actor_error!(
                illegal_argument,
                "root key cannot be added as a verified client"
            ));
        }

        rt.transaction(|st: &mut State, rt| {
            // Validate caller is one of the verifiers, i.e. has an allowance (even if zero).
            let verifier = rt.message().caller();
            let verifier_cap = st
                .get_verifier_cap(rt.store(), &verifier)?
                .ok_or_else(|| actor_error!(not_found, "no such verifier {}", verifier))?;

            // Disallow existing verifiers as clients.
            if st.get_verifier_cap(rt.store(), &client)?.is_some() {
                return Err(actor_error!(
                    illegal_argument,
                    "verifier {} cannot be added as a verified client",
                    client
                ));
            }

            // Compute new verifier allowance.
            if verifier_cap < params.allowance {
                return Err(actor_error!(
                    illegal_argument,
                    "add more DataCap ({}) for verified client than allocated {}",
                    params.allowance,
                    verifier_cap
                ));
            }
            let new_verifier_cap = &verifier_cap - &params.allowance;
            st.put_verifier(rt.store(), &verifier, &new_verifier_cap)
                .context("failed to update verifier allowance")?;

            // This is a one-time, upfront allocation.
            // The allowance cannot be changed by calls to AddVerifiedClient as long as the
            // client entry exists. Parties needing more allowance must use up the current
            // allocation before a new one can be made.
            if st.get_verified_client_cap(rt.store(), &client)?.is_some() {
                return Err(actor_error!(
                    illegal_argument,
                    "verified client already exists: {}",
                    client
                ));
            }

            st.put_verified_client(rt.store(), &client, &params.allowance).with_context(|| {
                format!("failed to add verified client {} with cap {}", client, params.allowance)
            })
        })
    }

    /// Called by the storage market actor during publish storage deals.
    /// Does not allow partially verified deals (deal size must not exceed the remaining cap).
    /// Deletes the verified client if the remaining cap falls below the minimum verified
    /// deal size.
    pub fn use_bytes<BS, RT>(rt: &mut RT, params: UseBytesParams) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        rt.validate_immediate_caller_is(std::iter::once(&STORAGE_MARKET_ACTOR_ADDR))?;

        if params.deal_size < rt.policy().minimum_verified_deal_size {
            return Err(actor_error!(
                illegal_argument,
                "verified deal size {} is below minimum in UseBytes",
                params.deal_size
            ));
        }

        let client = resolve_to_id_addr(rt, &params.address).context_code(
            ExitCode::USR_ILLEGAL_STATE,
            format!("failed to resolve addr {} to ID addr", params.address),
        )?;

        rt.transaction(|st: &mut State, rt| {
            let vc_cap = st
                .get_verified_client_cap(rt.store(), &client)?
                .ok_or_else(|| actor_error!(not_found, "no such verified client {}", client))?;
            assert!(!vc_cap.is_negative(), "negative cap for verified client {}", client);

            if params.deal_size > vc_cap {
                return Err(actor_error!(
                    illegal_argument,
                    "deal size {} exceeds allowable cap {} for verified client {}",
                    params.deal_size,
                    vc_cap,
                    client
                ));
            }

            let new_vc_cap = &vc_cap - &params.deal_size;
            if new_vc_cap < rt.policy().minimum_verified_deal_size {
                // Delete the entry if the remaining data cap is less than the minimum
                // verified deal size. It will be restored later if the deal did not get
                // activated with a proven sector.
                info!("removing verified client {} with residual cap {}", client, new_vc_cap);
                st.remove_verified_client(rt.store(), &client)
                    .with_context(|| format!("failed to delete verified client {}", client))
            } else {
                st.put_verified_client(rt.store(), &client, &new_vc_cap).with_context(|| {
                    format!("failed to update verified client {} with {}", client, new_vc_cap)
                })
            }
        })
    }

    /// Called by the storage market actor when a verified deal fails to be activated.
    /// Restores the client's allowable cap, creating a new entry if the client was deleted.
    pub fn restore_bytes<BS, RT>(rt: &mut RT, params: RestoreBytesParams) -> Result<(), ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        rt.validate_immediate_caller_is(std::iter::once(&STORAGE_MARKET_ACTOR_ADDR))?;

        if params.deal_size < rt.policy().minimum_verified_deal_size {
            return Err(actor_error!(
                illegal_argument,
                "below minimum verified deal size requested in RestoreBytes: {}",
                params.deal_size
            ));
        }

        let client = resolve_to_id_addr(rt, &params.address).context_code(
            ExitCode::USR_ILLEGAL_STATE,
            format!("failed to resolve addr {} to ID addr", params.address),
        )?;

        let st: State = rt.state()?;
        if client == st.root_key {
            return Err(actor_error!(illegal_argument, "cannot restore allowance for root key"));
        }

        rt.transaction(|st: &mut State, rt| {
            // Disallow restoring bytes for a verifier.
            if st.get_verifier_cap(rt.store(), &client)?.is_some() {
                return Err(actor_error!(
                    illegal_argument,
                    "cannot restore allowance for verifier {}",
                    client
                ));
            }

            let vc_cap = st.get_verified_client_cap(rt.store(), &client)?.unwrap_or_default();
            let new_vc_cap = &vc_cap + &params.deal_size;
            st.put_verified_client(rt.store(), &client, &new_vc_cap).with_context(|| {
                format!("failed to put verified client {} with {}", client, new_vc_cap)
            })
        })
    }
}

impl ActorCode for Actor {
    fn invoke_method<BS, RT>(
        rt: &mut RT,
        method: MethodNum,
        params: &RawBytes,
    ) -> Result<RawBytes, ActorError>
    where
        BS: Blockstore,
        RT: Runtime<BS>,
    {
        match FromPrimitive::from_u64(method) {
            Some(Method::Constructor) => {
                Self::constructor(rt, cbor::deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::AddVerifier) => {
                Self::add_verifier(rt, cbor::deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::RemoveVerifier) => {
                Self::remove_verifier(rt, cbor::deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::AddVerifiedClient) => {
                Self::add_verified_client(rt, cbor::deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::UseBytes) => {
                Self::use_bytes(rt, cbor::deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            Some(Method::RestoreBytes) => {
                Self::restore_bytes(rt, cbor::deserialize_params(params)?)?;
                Ok(RawBytes::default())
            }
            None => Err(actor_error!(unhandled_message; "Invalid method")),
        }
    }
}
