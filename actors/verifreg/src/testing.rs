// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::HashMap;

use fvm_ipld_blockstore::Blockstore;
use fvm_shared::address::{Address, Protocol};
use fvm_shared::bigint::bigint_ser::BigIntDe;
use num_traits::Signed;

use fil_actors_runtime::{make_map_with_root_and_bitwidth, MessageAccumulator, HAMT_BIT_WIDTH};

use crate::{DataCap, State};

pub struct StateSummary {
    pub verifiers: HashMap<Address, DataCap>,
    pub clients: HashMap<Address, DataCap>,
}

/// Checks internal invariants of verified registry state.
pub fn check_state_invariants<BS: Blockstore>(
    state: &State,
    store: &BS,
    min_verified_deal_size: &DataCap,
) -> (StateSummary, MessageAccumulator) {
    let acc = MessageAccumulator::default();

    acc.require(
        state.root_key.protocol() == Protocol::ID,
        format!("root key {} should have ID protocol", state.root_key),
    );

    // check verifiers
    let mut all_verifiers = HashMap::new();
    match make_map_with_root_and_bitwidth::<_, BigIntDe>(&state.verifiers, store, HAMT_BIT_WIDTH) {
        Ok(verifiers) => {
            let ret = verifiers.for_each(|key, cap| {
                let verifier = Address::from_bytes(key)?;
                let cap = &cap.0;

                acc.require(
                    verifier.protocol() == Protocol::ID,
                    format!("verifier {verifier} should have ID protocol"),
                );
                acc.require(
                    !cap.is_negative(),
                    format!("verifier {verifier} cap {cap} is negative"),
                );
                acc.require(
                    verifier != state.root_key,
                    format!("root key {verifier} should not be a verifier"),
                );
                all_verifiers.insert(verifier, cap.clone());
                Ok(())
            });

            acc.require_no_error(ret, "error iterating verifiers");
        }
        Err(e) => acc.add(format!("error loading verifiers {e}")),
    }

    // check verified clients
    let mut all_clients = HashMap::new();
    match make_map_with_root_and_bitwidth::<_, BigIntDe>(
        &state.verified_clients,
        store,
        HAMT_BIT_WIDTH,
    ) {
        Ok(clients) => {
            let ret = clients.for_each(|key, cap| {
                let client = Address::from_bytes(key)?;
                let cap = &cap.0;

                acc.require(
                    client.protocol() == Protocol::ID,
                    format!("verified client {client} should have ID protocol"),
                );
                acc.require(
                    cap >= min_verified_deal_size,
                    format!("verified client {client} cap {cap} is below the minimum deal size"),
                );
                acc.require(
                    client != state.root_key,
                    format!("root key {client} should not be a verified client"),
                );
                all_clients.insert(client, cap.clone());
                Ok(())
            });

            acc.require_no_error(ret, "error iterating verified clients");
        }
        Err(e) => acc.add(format!("error loading verified clients {e}")),
    }

    // verifier and client roles are exclusive
    for client in all_clients.keys() {
        acc.require(
            !all_verifiers.contains_key(client),
            format!("address {client} is both a verifier and a verified client"),
        );
    }

    (StateSummary { verifiers: all_verifiers, clients: all_clients }, acc)
}
