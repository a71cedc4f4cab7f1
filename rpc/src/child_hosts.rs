// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tree membership for the `AddChildHost`/`RemoveChildHost` RPCs. A parent node merely
//! forwards policy and aggregates samples from its children per the design's non-goals; this
//! registry only tracks which child URLs are currently attached.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Default)]
pub struct ChildHostRegistry {
    urls: Mutex<HashSet<String>>,
}

impl ChildHostRegistry {
    pub fn new() -> Self {
        ChildHostRegistry::default()
    }

    /// Returns `true` if the URL was newly added.
    pub fn add(&self, url: String) -> bool {
        self.urls.lock().unwrap_or_else(|e| e.into_inner()).insert(url)
    }

    /// Returns `true` if the URL was present and removed.
    pub fn remove(&self, url: &str) -> bool {
        self.urls.lock().unwrap_or_else(|e| e.into_inner()).remove(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_remove_round_trips() {
        let registry = ChildHostRegistry::new();
        assert!(registry.add("grpc://child-1:50051".to_string()));
        assert!(!registry.add("grpc://child-1:50051".to_string()));
        assert!(registry.remove("grpc://child-1:50051"));
        assert!(!registry.remove("grpc://child-1:50051"));
    }
}
