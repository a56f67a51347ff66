use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    domain::{DeviceId, DeviceInfo, OrganizationId},
    errors::Error,
    ports::GatewayPort,
    Result,
};

/// Cached device listing.
///
/// The gateway stays authoritative; views read the cache and ask for a
/// `refresh()` after anything that changes a device (creation, pairing).
pub struct DeviceDirectory {
    gateway: Arc<dyn GatewayPort>,
    devices: Mutex<Vec<DeviceInfo>>,
}

impl DeviceDirectory {
    pub fn new(gateway: Arc<dyn GatewayPort>) -> Self {
        Self {
            gateway,
            devices: Mutex::new(Vec::new()),
        }
    }

    pub async fn refresh(&self) -> Result<usize> {
        let listed = self.gateway.list_devices().await?;
        let n = listed.len();
        *self.devices.lock().await = listed;
        tracing::debug!(devices = n, "device listing refreshed");
        Ok(n)
    }

    pub async fn devices(&self) -> Vec<DeviceInfo> {
        self.devices.lock().await.clone()
    }

    pub async fn get(&self, id: &DeviceId) -> Option<DeviceInfo> {
        self.devices
            .lock()
            .await
            .iter()
            .find(|d| &d.id == id)
            .cloned()
    }

    /// Create a device on the gateway and refresh the listing.
    pub async fn create(&self, name: &str, organization: &OrganizationId) -> Result<DeviceInfo> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("device name is required".to_string()));
        }

        let created = self.gateway.create_device(name, organization).await?;
        tracing::info!(device = %created.id, "device created");

        // The device exists even if the listing refresh fails.
        if let Err(e) = self.refresh().await {
            tracing::warn!("device listing refresh failed after create: {e}");
        }
        Ok(created)
    }
}
