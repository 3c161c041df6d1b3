// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::bigint::bigint_ser::BigIntDe;
use fvm_shared::error::ExitCode;

use fil_actors_runtime::{
    actor_error, make_empty_map, make_map_with_root_and_bitwidth, ActorError, AsActorError,
    HAMT_BIT_WIDTH,
};

use crate::DataCap;

#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct State {
    /// Address of the root key holder, the only caller allowed to appoint
    /// or remove verifiers. Always an ID address, set once at construction.
    pub root_key: Address,
    /// Maps verifier addresses to data cap allowance (in bytes).
    pub verifiers: Cid,
    /// Maps verified client addresses to remaining data cap (in bytes).
    pub verified_clients: Cid,
}

impl State {
    pub fn new<BS: Blockstore>(store: &BS, root_key: Address) -> Result<State, ActorError> {
        let empty_map = make_empty_map::<_, ()>(store, HAMT_BIT_WIDTH)
            .flush()
            .map_err(|e| actor_error!(illegal_state, "failed to create empty map: {}", e))?;

        Ok(State { root_key, verifiers: empty_map, verified_clients: empty_map })
    }

    // Adds a verifier and cap, overwriting any existing cap for that verifier.
    pub fn put_verifier(
        &mut self,
        store: &impl Blockstore,
        verifier: &Address,
        cap: &DataCap,
    ) -> Result<(), ActorError> {
        let mut verifiers =
            make_map_with_root_and_bitwidth::<_, BigIntDe>(&self.verifiers, store, HAMT_BIT_WIDTH)
                .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to load verifiers")?;
        verifiers
            .set(verifier.to_bytes().into(), BigIntDe(cap.clone()))
            .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to set verifier")?;
        self.verifiers = verifiers
            .flush()
            .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to flush verifiers")?;
        Ok(())
    }

    pub fn remove_verifier(
        &mut self,
        store: &impl Blockstore,
        verifier: &Address,
    ) -> Result<(), ActorError> {
        let mut verifiers =
            make_map_with_root_and_bitwidth::<_, BigIntDe>(&self.verifiers, store, HAMT_BIT_WIDTH)
                .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to load verifiers")?;

        verifiers
            .delete(&verifier.to_bytes())
            .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to remove verifier")?
            .context_code(ExitCode::USR_ILLEGAL_STATE, "verifier not found")?;

        self.verifiers = verifiers
            .flush()
            .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to flush verifiers")?;
        Ok(())
    }

    pub fn get_verifier_cap(
        &self,
        store: &impl Blockstore,
        verifier: &Address,
    ) -> Result<Option<DataCap>, ActorError> {
        let verifiers =
            make_map_with_root_and_bitwidth::<_, BigIntDe>(&self.verifiers, store, HAMT_BIT_WIDTH)
                .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to load verifiers")?;
        let allowance = verifiers
            .get(&verifier.to_bytes())
            .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to get verifier")?;
        Ok(allowance.map(|a| a.0.clone()))
    }

    // Sets the remaining cap for a verified client, overwriting any previous value.
    pub fn put_verified_client(
        &mut self,
        store: &impl Blockstore,
        client: &Address,
        cap: &DataCap,
    ) -> Result<(), ActorError> {
        let mut verified_clients = make_map_with_root_and_bitwidth::<_, BigIntDe>(
            &self.verified_clients,
            store,
            HAMT_BIT_WIDTH,
        )
        .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to load verified clients")?;
        verified_clients
            .set(client.to_bytes().into(), BigIntDe(cap.clone()))
            .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to set verified client")?;
        self.verified_clients = verified_clients
            .flush()
            .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to flush verified clients")?;
        Ok(())
    }

    pub fn remove_verified_client(
        &mut self,
        store: &impl Blockstore,
        client: &Address,
    ) -> Result<(), ActorError> {
        let mut verified_clients = make_map_with_root_and_bitwidth::<_, BigIntDe>(
            &self.verified_clients,
            store,
            HAMT_BIT_WIDTH,
        )
        .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to load verified clients")?;

        verified_clients
            .delete(&client.to_bytes())
            .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to remove verified client")?
            .context_code(ExitCode::USR_ILLEGAL_STATE, "verified client not found")?;

        self.verified_clients = verified_clients
            .flush()
            .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to flush verified clients")?;
        Ok(())
    }

    pub fn get_verified_client_cap(
        &self,
        store: &impl Blockstore,
        client: &Address,
    ) -> Result<Option<DataCap>, ActorError> {
        let verified_clients = make_map_with_root_and_bitwidth::<_, BigIntDe>(
            &self.verified_clients,
            store,
            HAMT_BIT_WIDTH,
        )
        .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to load verified clients")?;
        let cap = verified_clients
            .get(&client.to_bytes())
            .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to get verified client")?;
        Ok(cap.map(|c| c.0.clone()))
    }
}
