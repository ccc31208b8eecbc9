use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type InstanceId = Uuid;

/// One running, addressable process offering a named service.
///
/// The registry owns the authoritative copy. Everything handed out by
/// discovery is a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    /// Assigned on the sending side when absent from a registration body.
    #[serde(default = "Uuid::new_v4")]
    pub instance_id: InstanceId,
    pub service_name: String,
    pub host: String,
    pub port: u16,
    /// Unix epoch milliseconds of the last accepted registration or heartbeat.
    #[serde(default, alias = "lastUpdateTimestamp")]
    pub last_heartbeat: u64,
    #[serde(default, alias = "metaData")]
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    /// Creates an instance description with a fresh id.
    pub fn new(service_name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        ServiceInstance {
            instance_id: Uuid::new_v4(),
            service_name: service_name.into(),
            host: host.into(),
            port,
            last_heartbeat: 0,
            metadata: HashMap::new(),
        }
    }

    pub fn with_instance_id(mut self, instance_id: InstanceId) -> Self {
        self.instance_id = instance_id;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// `host:port`, suitable for connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Body of a heartbeat: identifies an instance without re-describing it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub service_name: String,
    pub instance_id: InstanceId,
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
