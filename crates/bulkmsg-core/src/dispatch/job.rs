use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{
    config::{
        Config, DEFAULT_DISPATCH_TITLE, MAX_DISPATCH_INTERVAL_SECONDS,
        MIN_DISPATCH_INTERVAL_SECONDS,
    },
    domain::DeviceId,
    errors::Error,
    recipients::{RecipientEntry, RecipientSet},
    Result,
};

/// Longest message body accepted, in code points.
pub const MAX_MESSAGE_CHARS: usize = 4096;

const DEFAULT_INTERVAL_SECONDS: u32 = 5;

/// Binary payload sent as a single media message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }
}

/// One bulk send request: a message (and optional attachment) for an
/// ordered snapshot of recipients.
#[derive(Clone, Debug)]
pub struct DispatchJob {
    pub device_id: DeviceId,
    pub title: String,
    pub message: String,
    pub attachment: Option<Attachment>,
    pub recipients: Vec<RecipientEntry>,
    pub interval_seconds: u32,
}

impl DispatchJob {
    pub fn new(
        device_id: DeviceId,
        message: impl Into<String>,
        recipients: Vec<RecipientEntry>,
    ) -> Self {
        Self {
            device_id,
            title: DEFAULT_DISPATCH_TITLE.to_string(),
            message: message.into(),
            attachment: None,
            recipients,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
        }
    }

    /// Snapshot the set in its current order.
    pub fn for_set(device_id: DeviceId, message: impl Into<String>, set: &RecipientSet) -> Self {
        Self::new(device_id, message, set.to_ordered_list())
    }

    /// Apply the configured default interval and title.
    pub fn with_defaults_from(mut self, cfg: &Config) -> Self {
        self.interval_seconds = cfg.dispatch_interval_seconds;
        self.title = cfg.dispatch_default_title.clone();
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_interval_seconds(mut self, seconds: u32) -> Self {
        self.interval_seconds = seconds;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn total(&self) -> usize {
        self.recipients.len()
    }

    /// Reject malformed jobs before anything is sent.
    pub fn validate(&self) -> Result<()> {
        if self.device_id.0.trim().is_empty() {
            return Err(Error::Validation("a sending device is required".to_string()));
        }
        if self.recipients.is_empty() {
            return Err(Error::Validation("at least one recipient is required".to_string()));
        }

        let chars = self.message.chars().count();
        if chars > MAX_MESSAGE_CHARS {
            return Err(Error::Validation(format!(
                "message is {chars} characters long (max {MAX_MESSAGE_CHARS})"
            )));
        }
        if self.attachment.is_none() && self.message.trim().is_empty() {
            return Err(Error::Validation(
                "message text is required without an attachment".to_string(),
            ));
        }

        if let Some(a) = &self.attachment {
            if a.mime_type.trim().is_empty() {
                return Err(Error::Validation("attachment MIME type is required".to_string()));
            }
            if a.data.is_empty() {
                return Err(Error::Validation("attachment is empty".to_string()));
            }
        }

        if !(MIN_DISPATCH_INTERVAL_SECONDS..=MAX_DISPATCH_INTERVAL_SECONDS)
            .contains(&self.interval_seconds)
        {
            return Err(Error::Validation(format!(
                "interval must be between {MIN_DISPATCH_INTERVAL_SECONDS} and {MAX_DISPATCH_INTERVAL_SECONDS} seconds"
            )));
        }

        Ok(())
    }
}
