//! HTTP adapter (reqwest).
//!
//! Implements the `bulkmsg-core` gateway and notification-store ports over the
//! remote JSON APIs. Both share one bearer token and one HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use bulkmsg_core::{
    config::Config,
    domain::{DeviceId, DeviceInfo, DeviceStatus, OrganizationId},
    errors::Error,
    ports::{
        GatewayPort, HistoryPage, HistoryQuery, MediaMessage, NotificationRecord,
        NotificationStore, PairResponse, TextMessage,
    },
    Result,
};

const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Clone, Debug)]
pub struct HttpGateway {
    gateway_base: Url,
    store_base: Url,
    api_token: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateDeviceBody<'a> {
    name: &'a str,
    organization_id: &'a OrganizationId,
}

/// Message body addressed through a device.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ViaDevice<'a, T: Serialize> {
    device_id: &'a DeviceId,
    #[serde(flatten)]
    message: &'a T,
}

#[derive(Deserialize)]
struct StatusBody {
    status: DeviceStatus,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DeviceListing {
    Bare(Vec<DeviceInfo>),
    Wrapped { data: Vec<DeviceInfo> },
}

impl HttpGateway {
    pub fn new(
        gateway_base: &str,
        store_base: &str,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;

        Ok(Self {
            gateway_base: parse_base(gateway_base)?,
            store_base: parse_base(store_base)?,
            api_token: api_token.into(),
            http,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            &cfg.gateway_base_url,
            &cfg.notification_base_url,
            cfg.gateway_api_token.clone(),
            cfg.http_timeout,
        )
    }

    fn gateway_url(&self, segments: &[&str]) -> Result<Url> {
        endpoint(&self.gateway_base, segments)
    }

    fn store_url(&self, segments: &[&str]) -> Result<Url> {
        endpoint(&self.store_base, segments)
    }

    async fn execute(&self, what: &str, req: RequestBuilder) -> Result<reqwest::Response> {
        let resp = req
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{what} request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "{what} failed: {status} {}",
                body.chars().take(ERROR_BODY_PREVIEW).collect::<String>()
            )));
        }

        Ok(resp)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, what: &str, req: RequestBuilder) -> Result<T> {
        let resp = self.execute(what, req).await?;
        resp.json::<T>()
            .await
            .map_err(|e| Error::Transport(format!("{what} json error: {e}")))
    }
}

#[async_trait]
impl GatewayPort for HttpGateway {
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        let url = self.gateway_url(&["devices"])?;
        let listing: DeviceListing = self.fetch_json("list devices", self.http.get(url)).await?;
        Ok(match listing {
            DeviceListing::Bare(v) => v,
            DeviceListing::Wrapped { data } => data,
        })
    }

    async fn create_device(
        &self,
        name: &str,
        organization: &OrganizationId,
    ) -> Result<DeviceInfo> {
        let url = self.gateway_url(&["devices"])?;
        let body = CreateDeviceBody {
            name,
            organization_id: organization,
        };
        self.fetch_json("create device", self.http.post(url).json(&body))
            .await
    }

    async fn device_status(&self, device: &DeviceId) -> Result<DeviceStatus> {
        let url = self.gateway_url(&["devices", &device.0, "status"])?;
        let body: StatusBody = self.fetch_json("device status", self.http.get(url)).await?;
        Ok(body.status)
    }

    async fn request_pairing(&self, device: &DeviceId) -> Result<PairResponse> {
        let url = self.gateway_url(&["devices", &device.0, "pair"])?;
        let resp = self.execute("pair device", self.http.post(url)).await?;

        // Some gateways answer an already-active device with an empty body.
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Transport(format!("pair device read error: {e}")))?;
        if text.trim().is_empty() {
            return Ok(PairResponse::default());
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn send_text(&self, device: &DeviceId, msg: &TextMessage) -> Result<()> {
        let url = self.gateway_url(&["messages", "send"])?;
        let body = ViaDevice {
            device_id: device,
            message: msg,
        };
        self.execute("send message", self.http.post(url).json(&body))
            .await?;
        tracing::debug!(device = %device, to = %msg.to, "text message sent");
        Ok(())
    }

    async fn send_media(&self, device: &DeviceId, msg: &MediaMessage) -> Result<()> {
        let url = self.gateway_url(&["messages", "sendMedia"])?;
        let body = ViaDevice {
            device_id: device,
            message: msg,
        };
        self.execute("send media", self.http.post(url).json(&body))
            .await?;
        tracing::debug!(device = %device, to = %msg.to, mime = %msg.mime_type, "media message sent");
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for HttpGateway {
    async fn record(&self, record: &NotificationRecord) -> Result<()> {
        let url = self.store_url(&["notifications"])?;
        self.execute("record notification", self.http.post(url).json(record))
            .await?;
        Ok(())
    }

    async fn list(&self, query: &HistoryQuery) -> Result<HistoryPage> {
        let url = self.store_url(&["notifications"])?;
        let req = self.http.get(url).query(&query.to_pairs());
        self.fetch_json("list notifications", req).await
    }
}

fn parse_base(base: &str) -> Result<Url> {
    let url =
        Url::parse(base).map_err(|e| Error::Config(format!("invalid base url {base}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(Error::Config(format!("base url cannot be a base: {base}")));
    }
    Ok(url)
}

/// Append percent-encoded path segments to `base`.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| Error::Config(format!("base url cannot be a base: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
