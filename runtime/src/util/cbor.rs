// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::{from_slice, RawBytes};
use serde::de::DeserializeOwned;

use crate::{actor_error, ActorError};

/// Deserialises CBOR-encoded bytes as a structure, returning a serialization error on failure.
pub fn deserialize<O: DeserializeOwned>(v: &RawBytes, name: &str) -> Result<O, ActorError> {
    from_slice(v).map_err(|e| actor_error!(serialization; "failed to deserialize {}: {}", name, e))
}

/// Deserialises CBOR-encoded bytes as a method parameters object.
pub fn deserialize_params<O: DeserializeOwned>(params: &RawBytes) -> Result<O, ActorError> {
    deserialize(params, "method parameters")
}
