//! Identity of whoever is invoking an operation.
//!
//! Authentication happens upstream; by the time a request reaches the core,
//! the customer id (if any) and device id (if any) are already resolved.

use serde::{Deserialize, Serialize};

/// Resolved caller identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Authenticated customer
    pub customer_id: Option<String>,
    /// Originating device (guests and customers both send one)
    pub device_id: Option<String>,
}

impl Caller {
    pub fn customer(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: Some(customer_id.into()),
            device_id: None,
        }
    }

    pub fn guest(device_id: impl Into<String>) -> Self {
        Self {
            customer_id: None,
            device_id: Some(device_id.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Builder: attach a device id
    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Opaque actor tag embedded in provider metadata: `customer:<id>` or `guest:<deviceId>`
    pub fn actor_tag(&self) -> String {
        match (&self.customer_id, &self.device_id) {
            (Some(customer_id), _) => format!("customer:{customer_id}"),
            (None, Some(device_id)) => format!("guest:{device_id}"),
            (None, None) => "guest:unknown".to_string(),
        }
    }
}

/// Extract the customer id from an actor tag written by [`Caller::actor_tag`]
pub fn customer_from_actor_tag(tag: &str) -> Option<&str> {
    tag.strip_prefix("customer:").filter(|id| !id.is_empty())
}

/// Compare two secrets without short-circuiting on the first differing byte
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}
