use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{DeviceId, DeviceInfo, DeviceStatus, OrganizationId},
    Result,
};

/// Response of the gateway pairing endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairResponse {
    /// Base64 image (data URL) or pairing code. Absent when the device is
    /// already active.
    #[serde(default)]
    pub pairing_artifact: Option<String>,
}

/// Plain text message addressed through a device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessage {
    pub to: String,
    pub text: String,
}

/// Media message; the payload is already base64 encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMessage {
    pub to: String,
    pub mime_type: String,
    pub data_base64: String,
    pub caption: String,
    pub file_name: String,
}

/// Hexagonal port for the remote messaging gateway.
#[async_trait]
pub trait GatewayPort: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>>;
    async fn create_device(&self, name: &str, organization: &OrganizationId)
        -> Result<DeviceInfo>;
    async fn device_status(&self, device: &DeviceId) -> Result<DeviceStatus>;
    async fn request_pairing(&self, device: &DeviceId) -> Result<PairResponse>;

    async fn send_text(&self, device: &DeviceId, msg: &TextMessage) -> Result<()>;
    async fn send_media(&self, device: &DeviceId, msg: &MediaMessage) -> Result<()>;
}

/// Outbound message record persisted by the notification store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub name: String,
    pub message: String,
    pub recipient: String,
    pub channel_id: String,
}

/// History listing request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryQuery {
    pub page: u32,
    pub limit: u32,
    /// Free-form filters passed through as query parameters.
    pub filters: BTreeMap<String, String>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            filters: BTreeMap::new(),
        }
    }
}

impl HistoryQuery {
    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Query string pairs in a stable order (`page`, `limit`, then filters).
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut out = vec![
            ("page".to_string(), self.page.to_string()),
            ("limit".to_string(), self.limit.to_string()),
        ];
        for (k, v) in &self.filters {
            if v.trim().is_empty() {
                continue;
            }
            out.push((k.clone(), v.clone()));
        }
        out
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub pages: u64,
}

/// One stored notification as returned by the history listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEntry {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub data: Vec<NotificationEntry>,
    pub pagination: Pagination,
}

/// Hexagonal port for the notification store.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn record(&self, record: &NotificationRecord) -> Result<()>;
    async fn list(&self, query: &HistoryQuery) -> Result<HistoryPage>;
}
