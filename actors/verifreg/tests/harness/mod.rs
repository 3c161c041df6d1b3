// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::MethodNum;
use lazy_static::lazy_static;

use fil_actor_verifreg::testing::check_state_invariants;
use fil_actor_verifreg::{
    Actor as VerifregActor, AddVerifierClientParams, AddVerifierParams, BytesParams, DataCap,
    Method, State,
};
use fil_actors_runtime::runtime::Runtime;
use fil_actors_runtime::test_utils::*;
use fil_actors_runtime::{ActorError, STORAGE_MARKET_ACTOR_ADDR, SYSTEM_ACTOR_ADDR};

lazy_static! {
    pub static ref ROOT_ADDR: Address = Address::new_id(101);
}

/// The minimum deal size in force for the runtime under test.
pub fn min_deal_size(rt: &MockRuntime) -> DataCap {
    rt.policy.minimum_verified_deal_size.clone()
}

/// A verifier budget slightly above the minimum deal size.
pub fn default_verifier_allowance(rt: &MockRuntime) -> DataCap {
    min_deal_size(rt) + 42
}

/// A client grant that fits within the default verifier budget.
pub fn default_client_allowance(rt: &MockRuntime) -> DataCap {
    default_verifier_allowance(rt) - 1
}

/// Constructs a registry rooted at [`ROOT_ADDR`], ready for use.
pub fn setup() -> (Harness, MockRuntime) {
    let mut rt = MockRuntime { receiver: *ROOT_ADDR, ..Default::default() };
    let h = Harness { root: *ROOT_ADDR };
    h.construct_and_verify(&mut rt, &h.root);
    (h, rt)
}

pub struct Harness {
    pub root: Address,
}

impl Harness {
    pub fn construct_and_verify(&self, rt: &mut MockRuntime, root_param: &Address) {
        rt.set_caller(*SYSTEM_ACTOR_CODE_ID, SYSTEM_ACTOR_ADDR);
        rt.expect_validate_caller_addr(vec![SYSTEM_ACTOR_ADDR]);
        self.call_expect_empty(
            rt,
            Method::Constructor,
            &RawBytes::serialize(root_param).unwrap(),
        )
        .unwrap();

        // A fresh registry records the resolved root and neither role has members.
        let state: State = rt.get_state();
        assert_eq!(self.root, state.root_key);
        let (summary, acc) =
            check_state_invariants(&state, rt.store(), &rt.policy.minimum_verified_deal_size);
        acc.assert_empty();
        assert!(summary.verifiers.is_empty());
        assert!(summary.clients.is_empty());
    }

    pub fn add_verifier(
        &self,
        rt: &mut MockRuntime,
        verifier: &Address,
        allowance: &DataCap,
    ) -> Result<(), ActorError> {
        let params = AddVerifierParams { address: *verifier, allowance: allowance.clone() };
        self.as_root(rt, Method::AddVerifier, &RawBytes::serialize(&params).unwrap())
    }

    pub fn remove_verifier(
        &self,
        rt: &mut MockRuntime,
        verifier: &Address,
    ) -> Result<(), ActorError> {
        self.as_root(rt, Method::RemoveVerifier, &RawBytes::serialize(verifier).unwrap())
    }

    pub fn add_client(
        &self,
        rt: &mut MockRuntime,
        verifier: &Address,
        client: &Address,
        allowance: &DataCap,
    ) -> Result<(), ActorError> {
        rt.expect_validate_caller_any();
        rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, *verifier);
        let params = AddVerifierClientParams { address: *client, allowance: allowance.clone() };
        self.call_expect_empty(
            rt,
            Method::AddVerifiedClient,
            &RawBytes::serialize(&params).unwrap(),
        )
    }

    pub fn use_bytes(
        &self,
        rt: &mut MockRuntime,
        client: &Address,
        deal_size: &DataCap,
    ) -> Result<(), ActorError> {
        self.as_market(rt, Method::UseBytes, client, deal_size)
    }

    pub fn restore_bytes(
        &self,
        rt: &mut MockRuntime,
        client: &Address,
        deal_size: &DataCap,
    ) -> Result<(), ActorError> {
        self.as_market(rt, Method::RestoreBytes, client, deal_size)
    }

    /// Reads a verifier's remaining allowance from state, resolving the address first.
    pub fn verifier_cap(&self, rt: &MockRuntime, verifier: &Address) -> Option<DataCap> {
        let id_addr = rt.get_id_address(verifier).unwrap();
        let state: State = rt.get_state();
        state.get_verifier_cap(&rt.store, &id_addr).unwrap()
    }

    /// Reads a client's remaining data cap from state, resolving the address first.
    pub fn client_cap(&self, rt: &MockRuntime, client: &Address) -> Option<DataCap> {
        let id_addr = rt.get_id_address(client).unwrap();
        let state: State = rt.get_state();
        state.get_verified_client_cap(&rt.store, &id_addr).unwrap()
    }

    pub fn check_state(&self, rt: &MockRuntime) {
        let (_, acc) = check_state_invariants(
            &rt.get_state(),
            rt.store(),
            &rt.policy.minimum_verified_deal_size,
        );
        acc.assert_empty();
    }

    // Invokes a method as the root key holder.
    fn as_root(
        &self,
        rt: &mut MockRuntime,
        method: Method,
        params: &RawBytes,
    ) -> Result<(), ActorError> {
        rt.expect_validate_caller_addr(vec![self.root]);
        rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, self.root);
        self.call_expect_empty(rt, method, params)
    }

    // Invokes a byte-accounting method as the storage market actor.
    fn as_market(
        &self,
        rt: &mut MockRuntime,
        method: Method,
        client: &Address,
        deal_size: &DataCap,
    ) -> Result<(), ActorError> {
        rt.expect_validate_caller_addr(vec![STORAGE_MARKET_ACTOR_ADDR]);
        rt.set_caller(*MARKET_ACTOR_CODE_ID, STORAGE_MARKET_ACTOR_ADDR);
        let params = BytesParams { address: *client, deal_size: deal_size.clone() };
        self.call_expect_empty(rt, method, &RawBytes::serialize(&params).unwrap())
    }

    // All registry methods return an empty value on success.
    fn call_expect_empty(
        &self,
        rt: &mut MockRuntime,
        method: Method,
        params: &RawBytes,
    ) -> Result<(), ActorError> {
        let ret = rt.call::<VerifregActor>(method as MethodNum, params)?;
        assert_eq!(RawBytes::default(), ret);
        rt.verify();
        Ok(())
    }
}
