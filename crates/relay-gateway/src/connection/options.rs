//! Per-connection upgrade options

use serde_json::Value;
use std::collections::HashMap;

/// Options applied to a connection before it is registered
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub(crate) user_id: Option<String>,
    pub(crate) metadata: HashMap<String, Value>,
}

impl ConnectOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate the connection with an application user
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Seed one metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
