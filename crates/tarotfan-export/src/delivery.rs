// ABOUTME: Delivery cascade for a captured image: native file share, text share, then download.
// ABOUTME: Each strategy is capability-gated and reports an explicit outcome to the cascade.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use crate::error::{ExportError, ShareError};
use crate::host::{Downloader, ShareRequest, ShareSheet};

pub const PNG_MIME: &str = "image/png";

/// A captured image ready to hand to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFile {
    pub name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn png(name: String, bytes: Vec<u8>) -> Self {
        Self {
            name,
            mime: PNG_MIME,
            bytes,
        }
    }
}

/// `<prefix>-<year>-<unix-millis>.png`
pub fn file_name(prefix: &str, year: i32, unix_millis: i64) -> String {
    format!("{prefix}-{year}-{unix_millis}.png")
}

/// A download request: the suggested file name and a data URL with the
/// image inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    pub file_name: String,
    pub href: String,
}

impl DownloadLink {
    pub fn for_image(file: &ImageFile) -> Self {
        Self {
            file_name: file.name.clone(),
            href: format!("data:{};base64,{}", file.mime, STANDARD.encode(&file.bytes)),
        }
    }

    /// Decode the inline payload of a `data:<mime>;base64,` href.
    pub fn decode(&self) -> Option<Vec<u8>> {
        let (_, encoded) = self.href.split_once(";base64,")?;
        STANDARD.decode(encoded).ok()
    }
}

/// Title and text sent with a native share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareMessage {
    pub title: String,
    pub text: String,
}

/// How a successful export reached the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Delivery {
    SharedFile { file_name: String },
    Downloaded { file_name: String },
}

/// Result of one strategy's attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    Delivered(Delivery),
    /// The user backed out; stop without falling back.
    Cancelled,
    /// Move on to the next strategy.
    Continue,
    /// Terminal failure.
    Failed(ExportError),
}

#[async_trait]
pub trait DeliveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn available(&self, file: &ImageFile) -> bool;

    async fn deliver(&self, file: &ImageFile) -> StrategyOutcome;
}

pub struct ShareFileStrategy {
    share: Arc<dyn ShareSheet>,
    message: ShareMessage,
}

impl ShareFileStrategy {
    pub fn new(share: Arc<dyn ShareSheet>, message: ShareMessage) -> Self {
        Self { share, message }
    }
}

#[async_trait]
impl DeliveryStrategy for ShareFileStrategy {
    fn name(&self) -> &'static str {
        "share-file"
    }

    fn available(&self, file: &ImageFile) -> bool {
        self.share.can_share() && self.share.can_share_files(file)
    }

    async fn deliver(&self, file: &ImageFile) -> StrategyOutcome {
        let request = ShareRequest {
            title: self.message.title.clone(),
            text: self.message.text.clone(),
            file: Some(file.clone()),
        };
        match self.share.share(request).await {
            Ok(()) => StrategyOutcome::Delivered(Delivery::SharedFile {
                file_name: file.name.clone(),
            }),
            Err(ShareError::Cancelled) => StrategyOutcome::Cancelled,
            Err(ShareError::Failed(reason)) => {
                let error = ExportError::ShareFailure(reason);
                tracing::warn!(%error, "file share failed, falling back");
                StrategyOutcome::Continue
            }
        }
    }
}

/// Shares the title and text only. Used on hosts that can share but not
/// attach files; the image still goes to the download strategy.
pub struct ShareTextStrategy {
    share: Arc<dyn ShareSheet>,
    message: ShareMessage,
}

impl ShareTextStrategy {
    pub fn new(share: Arc<dyn ShareSheet>, message: ShareMessage) -> Self {
        Self { share, message }
    }
}

#[async_trait]
impl DeliveryStrategy for ShareTextStrategy {
    fn name(&self) -> &'static str {
        "share-text"
    }

    fn available(&self, file: &ImageFile) -> bool {
        self.share.can_share() && !self.share.can_share_files(file)
    }

    async fn deliver(&self, _file: &ImageFile) -> StrategyOutcome {
        let request = ShareRequest {
            title: self.message.title.clone(),
            text: self.message.text.clone(),
            file: None,
        };
        match self.share.share(request).await {
            Ok(()) => {
                tracing::info!("prediction text shared");
                StrategyOutcome::Continue
            }
            Err(ShareError::Cancelled) => StrategyOutcome::Cancelled,
            Err(ShareError::Failed(reason)) => {
                let error = ExportError::ShareFailure(reason);
                tracing::warn!(%error, "text share failed, falling back");
                StrategyOutcome::Continue
            }
        }
    }
}

pub struct DownloadStrategy {
    downloader: Arc<dyn Downloader>,
}

impl DownloadStrategy {
    pub fn new(downloader: Arc<dyn Downloader>) -> Self {
        Self { downloader }
    }
}

#[async_trait]
impl DeliveryStrategy for DownloadStrategy {
    fn name(&self) -> &'static str {
        "download"
    }

    fn available(&self, _file: &ImageFile) -> bool {
        true
    }

    async fn deliver(&self, file: &ImageFile) -> StrategyOutcome {
        let link = DownloadLink::for_image(file);
        match self.downloader.save(&link).await {
            Ok(()) => StrategyOutcome::Delivered(Delivery::Downloaded {
                file_name: link.file_name,
            }),
            Err(e) => StrategyOutcome::Failed(ExportError::DownloadFailure(e.to_string())),
        }
    }
}

/// Ordered list of strategies. The first one to deliver, cancel or fail
/// ends the run.
pub struct Cascade {
    strategies: Vec<Box<dyn DeliveryStrategy>>,
}

impl Cascade {
    pub fn new(strategies: Vec<Box<dyn DeliveryStrategy>>) -> Self {
        Self { strategies }
    }

    /// File share, then text share, then download.
    pub fn standard(
        share: Arc<dyn ShareSheet>,
        downloader: Arc<dyn Downloader>,
        message: ShareMessage,
    ) -> Self {
        Self::new(vec![
            Box::new(ShareFileStrategy::new(Arc::clone(&share), message.clone())),
            Box::new(ShareTextStrategy::new(share, message)),
            Box::new(DownloadStrategy::new(downloader)),
        ])
    }

    /// Run the cascade. A cancelled share comes back as
    /// `ExportError::ShareCancelled`.
    pub async fn run(&self, file: &ImageFile) -> Result<Delivery, ExportError> {
        for strategy in &self.strategies {
            if !strategy.available(file) {
                tracing::debug!(strategy = strategy.name(), "strategy unavailable, skipping");
                continue;
            }
            match strategy.deliver(file).await {
                StrategyOutcome::Delivered(delivery) => return Ok(delivery),
                StrategyOutcome::Cancelled => return Err(ExportError::ShareCancelled),
                StrategyOutcome::Failed(error) => return Err(error),
                StrategyOutcome::Continue => {}
            }
        }
        Err(ExportError::DownloadFailure("no delivery strategy succeeded".into()))
    }
}
