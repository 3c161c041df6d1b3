// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::cell::RefCell;
use std::fmt::Display;

/// Accumulates a sequence of messages (e.g. validation failures).
#[derive(Default)]
pub struct MessageAccumulator {
    msgs: RefCell<Vec<String>>,
}

impl MessageAccumulator {
    pub fn is_empty(&self) -> bool {
        self.msgs.borrow().is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.msgs.borrow().to_owned()
    }

    /// Adds a message to the accumulator
    pub fn add(&self, msg: impl AsRef<str>) {
        self.msgs.borrow_mut().push(msg.as_ref().to_owned());
    }

    /// Adds a message if predicate is false
    pub fn require(&self, predicate: bool, msg: impl AsRef<str>) {
        if !predicate {
            self.add(msg);
        }
    }

    /// Adds a message if result is `Err`. Underlying error must be `Display`.
    pub fn require_no_error<V, E: Display>(&self, result: Result<V, E>, msg: impl AsRef<str>) {
        if let Err(e) = result {
            self.add(format!("{}: {}", msg.as_ref(), e));
        }
    }

    /// Panics with all accumulated messages if there are any.
    pub fn assert_empty(&self) {
        assert!(self.is_empty(), "{}", self.messages().join("\n"));
    }
}
