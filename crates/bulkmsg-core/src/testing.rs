//! In-memory fakes for the gateway and notification store ports.

use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    domain::{DeviceId, DeviceInfo, DeviceStatus, OrganizationId},
    errors::Error,
    ports::{
        GatewayPort, HistoryPage, HistoryQuery, MediaMessage, NotificationRecord,
        NotificationStore, PairResponse, TextMessage,
    },
    Result,
};

#[derive(Clone, Debug)]
pub enum PairScript {
    Artifact(String),
    AlreadyActive,
    Fail,
}

#[derive(Clone, Debug)]
pub enum StatusScript {
    Status(DeviceStatus),
    Fail,
}

pub struct FakeGateway {
    pub devices: Mutex<Vec<DeviceInfo>>,
    pub pair: Mutex<PairScript>,
    pub statuses: Mutex<VecDeque<StatusScript>>,
    pub status_delay: Mutex<Duration>,
    pub status_calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub fail_list: Mutex<bool>,
    pub media: Mutex<Vec<(DeviceId, MediaMessage)>>,
    pub media_delay: Mutex<Duration>,
    pub fail_media_to: Mutex<HashSet<String>>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
            pair: Mutex::new(PairScript::AlreadyActive),
            statuses: Mutex::new(VecDeque::new()),
            status_delay: Mutex::new(Duration::ZERO),
            status_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            fail_list: Mutex::new(false),
            media: Mutex::new(Vec::new()),
            media_delay: Mutex::new(Duration::ZERO),
            fail_media_to: Mutex::new(HashSet::new()),
        }
    }
}

impl FakeGateway {
    pub fn with_pair(script: PairScript) -> Self {
        let gw = Self::default();
        *gw.pair.lock().unwrap() = script;
        gw
    }

    pub fn push_statuses(&self, script: impl IntoIterator<Item = StatusScript>) {
        self.statuses.lock().unwrap().extend(script);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GatewayPort for FakeGateway {
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_list.lock().unwrap() {
            return Err(Error::Transport("device listing failed".to_string()));
        }
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn create_device(&self, name: &str, organization: &OrganizationId) -> Result<DeviceInfo> {
        let mut devices = self.devices.lock().unwrap();
        let info = DeviceInfo {
            id: DeviceId(format!("dev-{}", devices.len() + 1)),
            name: name.to_string(),
            organization_id: Some(organization.clone()),
            status: DeviceStatus::Created,
        };
        devices.push(info.clone());
        Ok(info)
    }

    async fn device_status(&self, _device: &DeviceId) -> Result<DeviceStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.status_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let next = self.statuses.lock().unwrap().pop_front();
        match next {
            Some(StatusScript::Status(s)) => Ok(s),
            Some(StatusScript::Fail) => Err(Error::Transport("status timeout".to_string())),
            None => Ok(DeviceStatus::Created),
        }
    }

    async fn request_pairing(&self, _device: &DeviceId) -> Result<PairResponse> {
        let script = self.pair.lock().unwrap().clone();
        match script {
            PairScript::Artifact(a) => Ok(PairResponse {
                pairing_artifact: Some(a),
            }),
            PairScript::AlreadyActive => Ok(PairResponse::default()),
            PairScript::Fail => Err(Error::Transport("gateway unreachable".to_string())),
        }
    }

    async fn send_text(&self, _device: &DeviceId, _msg: &TextMessage) -> Result<()> {
        Ok(())
    }

    async fn send_media(&self, device: &DeviceId, msg: &MediaMessage) -> Result<()> {
        let delay = *self.media_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_media_to.lock().unwrap().contains(&msg.to) {
            return Err(Error::Transport(format!("media rejected for {}", msg.to)));
        }
        self.media.lock().unwrap().push((device.clone(), msg.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub records: Mutex<Vec<NotificationRecord>>,
    pub fail_recipients: Mutex<HashSet<String>>,
}

impl FakeStore {
    pub fn failing_for(recipients: &[&str]) -> Self {
        let store = Self::default();
        store
            .fail_recipients
            .lock()
            .unwrap()
            .extend(recipients.iter().map(|r| r.to_string()));
        store
    }

    pub fn recipients(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.recipient.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationStore for FakeStore {
    async fn record(&self, record: &NotificationRecord) -> Result<()> {
        if self
            .fail_recipients
            .lock()
            .unwrap()
            .contains(&record.recipient)
        {
            return Err(Error::Transport(format!(
                "store rejected {}",
                record.recipient
            )));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn list(&self, query: &HistoryQuery) -> Result<HistoryPage> {
        let _ = query;
        Ok(HistoryPage::default())
    }
}
