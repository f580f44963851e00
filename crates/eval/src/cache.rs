//! Last-known-good values for unreliable sources.

use std::collections::HashMap;

/// Values remembered per `(function, handle)` for the life of the
/// evaluator, used when a fresh query fails.
#[derive(Debug, Default, Clone)]
pub struct UnreliableCache {
    values: HashMap<(String, String), String>,
}

impl UnreliableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, function: &str, handle: &str, value: &str) {
        self.values
            .insert((function.to_string(), handle.to_string()), value.to_string());
    }

    pub fn get(&self, function: &str, handle: &str) -> Option<&str> {
        self.values
            .get(&(function.to_string(), handle.to_string()))
            .map(String::as_str)
    }
}
