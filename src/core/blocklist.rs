//! Insert-only set of blocked source addresses.

use std::collections::HashSet;

use crate::error::AppError;

#[derive(Debug, Clone, Default)]
pub struct BlockList {
    addresses: HashSet<String>,
}

impl BlockList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block `addr`. Surrounding whitespace is ignored; an empty address or one
    /// containing inner whitespace is rejected. Returns false if already blocked.
    pub fn insert(&mut self, addr: &str) -> Result<bool, AppError> {
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(AppError::InvalidArgument(
                "address to block must not be empty".into(),
            ));
        }
        if addr.chars().any(char::is_whitespace) {
            return Err(AppError::InvalidArgument(format!(
                "malformed address '{addr}'"
            )));
        }
        Ok(self.addresses.insert(addr.to_string()))
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.addresses.contains(addr)
    }

    /// Blocked addresses in sorted order.
    pub fn addresses(&self) -> Vec<String> {
        let mut list: Vec<String> = self.addresses.iter().cloned().collect();
        list.sort();
        list
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
