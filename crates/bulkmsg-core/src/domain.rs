use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Gateway device id (opaque string).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tenant that owns a device (opaque string).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub String);

/// Identifier of a recipient inside one recipient set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(pub u64);

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Device status as reported by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Created,
    Disconnected,
    Connected,
    /// Anything the gateway reports that we do not model (e.g. "connecting").
    #[serde(other)]
    Unknown,
}

/// Locally cached connection state of a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Created,
    AwaitingPairing,
    Connected,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::AwaitingPairing => "awaiting pairing",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// What the user scans or types to link the messaging account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairingArtifact {
    QrImage {
        mime_type: String,
        data_base64: String,
    },
    Code(String),
}

impl PairingArtifact {
    /// Classify a raw gateway payload: `data:image/...;base64,` URLs become
    /// QR images, anything else is a pairing code.
    pub fn from_payload(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let re = Regex::new(r"^data:(image/[A-Za-z0-9.+-]+);base64,(.+)$").ok()?;
        if let Some(caps) = re.captures(raw) {
            return Some(Self::QrImage {
                mime_type: caps[1].to_string(),
                data_base64: caps[2].to_string(),
            });
        }

        Some(Self::Code(raw.to_string()))
    }
}

/// Cached view of one device connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceConnection {
    pub device_id: DeviceId,
    pub organization_id: OrganizationId,
    pub state: ConnectionState,
    pub pairing_artifact: Option<PairingArtifact>,
}

impl DeviceConnection {
    pub fn new(device_id: DeviceId, organization_id: OrganizationId) -> Self {
        Self {
            device_id,
            organization_id,
            state: ConnectionState::Created,
            pairing_artifact: None,
        }
    }
}

/// One row of the gateway device listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: DeviceId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub organization_id: Option<OrganizationId>,
    pub status: DeviceStatus,
}
