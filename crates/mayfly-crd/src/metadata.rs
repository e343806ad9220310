//! Object metadata shared by every stored resource

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Kubernetes-style object metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name, doubles as the workflow id on the wire
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,

    /// Monotonic version used for optimistic concurrency on status patches.
    /// Zero means the object has never been stored.
    #[serde(default)]
    pub resource_version: u64,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

impl ObjectMeta {
    /// Create new metadata with just a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Fill in the fields a store assigns on first write
    pub fn stamp_created(&mut self) {
        if self.uid.is_none() {
            self.uid = Some(Uuid::new_v4());
        }
        if self.creation_timestamp.is_none() {
            self.creation_timestamp = Some(chrono::Utc::now());
        }
    }
}

/// Type metadata (apiVersion, kind)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    pub api_version: String,
    pub kind: String,
}

impl TypeMeta {
    /// Type metadata for a canonical Workflow
    pub fn workflow() -> Self {
        Self {
            api_version: crate::API_VERSION.to_string(),
            kind: "Workflow".to_string(),
        }
    }
}

impl Default for TypeMeta {
    fn default() -> Self {
        Self::workflow()
    }
}
