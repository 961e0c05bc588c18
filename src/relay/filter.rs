//! Blacklist Filter

use std::collections::HashSet;

use crate::protocol::Header;

/// Message types to drain and drop instead of relaying.
///
/// Matching is exact and case-sensitive. Built once at startup and shared
/// read-only by every session.
#[derive(Debug, Clone, Default)]
pub struct BlacklistFilter {
    blocked: HashSet<String>,
}

impl BlacklistFilter {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            blocked: types.into_iter().map(Into::into).collect(),
        }
    }

    /// True if the message must be drained rather than forwarded.
    pub fn should_drop(&self, header: &Header) -> bool {
        self.is_blocked(header.device_type())
    }

    pub fn is_blocked(&self, device_type: &str) -> bool {
        self.blocked.contains(device_type)
    }

    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }

    /// Blocked type names in sorted order.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.blocked.iter().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}
