// ABOUTME: ExportPipeline turns a revealed prediction into a delivered PNG.
// ABOUTME: Validates the surface, captures it off-screen once, then runs the delivery cascade.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use serde::Serialize;

use crate::capture::capture;
use crate::delivery::{Cascade, Delivery, ImageFile, ShareMessage, file_name};
use crate::error::ExportError;
use crate::host::{AssetLoader, Document, Downloader, Notifier, Rasterizer, ShareSheet, SurfaceHandle};

pub const DEFAULT_FALLBACK_BACKGROUND: &str = "#0F8EFF";
pub const DEFAULT_FILE_PREFIX: &str = "tarot-prediction";

/// Tunables for capture and delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    /// Wait after mounting the clone so styles apply.
    pub settle: Duration,
    /// Upper bound on waiting for the background asset.
    pub asset_timeout: Duration,
    pub scale: f64,
    pub quality: f64,
    pub image_timeout: Duration,
    pub fallback_background: String,
    pub file_prefix: String,
    /// Year stamped into the file name and share text.
    pub year: i32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(500),
            asset_timeout: Duration::from_secs(1),
            scale: 2.0,
            quality: 0.95,
            image_timeout: Duration::from_secs(15),
            fallback_background: DEFAULT_FALLBACK_BACKGROUND.to_string(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            year: Utc::now().year(),
        }
    }
}

impl ExportConfig {
    pub fn share_message(&self) -> ShareMessage {
        ShareMessage {
            title: format!("My tarot prediction for {}", self.year),
            text: format!("Take a look at my tarot prediction for {}!", self.year),
        }
    }
}

/// Final result of one export request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ExportResult {
    Delivered(Delivery),
    Cancelled,
    Failed {
        #[serde(serialize_with = "error_message")]
        error: ExportError,
    },
}

fn error_message<S: serde::Serializer>(error: &ExportError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Host adapters the pipeline drives.
#[derive(Clone)]
pub struct ExportHost {
    pub document: Arc<dyn Document>,
    pub rasterizer: Arc<dyn Rasterizer>,
    pub assets: Arc<dyn AssetLoader>,
    pub share: Arc<dyn ShareSheet>,
    pub downloader: Arc<dyn Downloader>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct ExportPipeline {
    host: ExportHost,
    config: ExportConfig,
    cascade: Cascade,
}

impl ExportPipeline {
    pub fn new(host: ExportHost, config: ExportConfig) -> Self {
        let cascade = Cascade::standard(
            Arc::clone(&host.share),
            Arc::clone(&host.downloader),
            config.share_message(),
        );
        Self {
            host,
            config,
            cascade,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Export the prediction behind `handle`. Never returns an error
    /// directly; every failure is folded into the result, and user-visible
    /// failures are reported to the notifier exactly once.
    pub async fn export(&self, handle: &SurfaceHandle) -> ExportResult {
        let result = match self.try_export(handle).await {
            Ok(delivery) => {
                tracing::info!(?delivery, "prediction exported");
                ExportResult::Delivered(delivery)
            }
            Err(ExportError::ShareCancelled) => {
                tracing::info!("export cancelled from the share sheet");
                ExportResult::Cancelled
            }
            Err(error) => {
                tracing::error!(%error, "export failed");
                ExportResult::Failed { error }
            }
        };

        if let ExportResult::Failed { error } = &result {
            if error.is_user_visible() {
                self.host.notifier.notify(error);
            }
        }
        result
    }

    async fn try_export(&self, handle: &SurfaceHandle) -> Result<Delivery, ExportError> {
        let snapshot = self
            .host
            .document
            .resolve(handle)
            .filter(|snapshot| snapshot.visible)
            .ok_or(ExportError::NotReady)?;

        let raster = capture(
            self.host.document.as_ref(),
            self.host.rasterizer.as_ref(),
            self.host.assets.as_ref(),
            handle,
            &snapshot,
            &self.config,
        )
        .await?;

        let name = file_name(&self.config.file_prefix, self.config.year, Utc::now().timestamp_millis());
        let file = ImageFile::png(name, raster.png);
        self.cascade.run(&file).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HostError, ShareError};
    use crate::testing::{
        MemoryDocument, MemoryDownloader, RecordingNotifier, ScriptedShareSheet, StubAssetLoader,
        StubRasterizer,
    };
    use ulid::Ulid;

    struct Rig {
        document: Arc<MemoryDocument>,
        rasterizer: Arc<StubRasterizer>,
        assets: Arc<StubAssetLoader>,
        share: Arc<ScriptedShareSheet>,
        downloader: Arc<MemoryDownloader>,
        notifier: Arc<RecordingNotifier>,
    }

    impl Rig {
        fn new(share: ScriptedShareSheet) -> Self {
            Self {
                document: Arc::new(MemoryDocument::new("https://tarot.example")),
                rasterizer: Arc::new(StubRasterizer::ok()),
                assets: Arc::new(StubAssetLoader::ready()),
                share: Arc::new(share),
                downloader: Arc::new(MemoryDownloader::new()),
                notifier: Arc::new(RecordingNotifier::default()),
            }
        }

        fn pipeline(&self) -> ExportPipeline {
            let host = ExportHost {
                document: self.document.clone(),
                rasterizer: self.rasterizer.clone(),
                assets: self.assets.clone(),
                share: self.share.clone(),
                downloader: self.downloader.clone(),
                notifier: self.notifier.clone(),
            };
            let config = ExportConfig {
                year: 2026,
                ..ExportConfig::default()
            };
            ExportPipeline::new(host, config)
        }

        fn revealed_surface(&self) -> SurfaceHandle {
            let handle = SurfaceHandle(Ulid::new());
            self.document.insert(handle, MemoryDocument::visible_snapshot());
            handle
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_surface_is_not_ready() {
        let rig = Rig::new(ScriptedShareSheet::unsupported());
        let handle = SurfaceHandle(Ulid::new());
        let mut snapshot = MemoryDocument::visible_snapshot();
        snapshot.visible = false;
        rig.document.insert(handle, snapshot);

        let result = rig.pipeline().export(&handle).await;
        assert_eq!(result, ExportResult::Failed { error: ExportError::NotReady });
        assert_eq!(rig.document.mount_count(), 0, "nothing is captured");
        assert_eq!(rig.notifier.notifications(), vec![ExportError::NotReady]);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_surface_is_not_ready() {
        let rig = Rig::new(ScriptedShareSheet::unsupported());
        let result = rig.pipeline().export(&SurfaceHandle(Ulid::new())).await;
        assert_eq!(result, ExportResult::Failed { error: ExportError::NotReady });
        assert!(rig.downloader.saved().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn download_only_host_gets_a_png() {
        let rig = Rig::new(ScriptedShareSheet::unsupported());
        let handle = rig.revealed_surface();

        let result = rig.pipeline().export(&handle).await;
        let ExportResult::Delivered(Delivery::Downloaded { file_name }) = result else {
            panic!("expected a download, got {result:?}");
        };
        assert!(file_name.starts_with("tarot-prediction-2026-"));
        assert!(file_name.ends_with(".png"));

        let saved = rig.downloader.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].decode(), Some(StubRasterizer::PNG.to_vec()));
        assert!(rig.notifier.notifications().is_empty());
        assert_eq!(rig.document.mounted(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn background_asset_is_resolved_and_preloaded() {
        let rig = Rig::new(ScriptedShareSheet::unsupported());
        let handle = rig.revealed_surface();

        rig.pipeline().export(&handle).await;
        assert_eq!(rig.assets.requested(), vec!["https://tarot.example/img/bg_2.svg".to_string()]);
        let options = rig.rasterizer.last_options().expect("rasterized once");
        assert_eq!(options.background_color, "rgb(15, 142, 255)");
        assert_eq!(options.background_image.as_deref(), Some(r#"url("/img/bg_2.svg")"#));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_background_asset_does_not_block_capture() {
        let mut rig = Rig::new(ScriptedShareSheet::unsupported());
        rig.assets = Arc::new(StubAssetLoader::hanging());
        let handle = rig.revealed_surface();

        let result = rig.pipeline().export(&handle).await;
        assert!(matches!(result, ExportResult::Delivered(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_background_asset_is_tolerated() {
        let mut rig = Rig::new(ScriptedShareSheet::unsupported());
        rig.assets = Arc::new(StubAssetLoader::failing());
        let handle = rig.revealed_surface();

        let result = rig.pipeline().export(&handle).await;
        assert!(matches!(result, ExportResult::Delivered(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn rasterizer_error_is_capture_failure_and_clone_is_removed() {
        let mut rig = Rig::new(ScriptedShareSheet::unsupported());
        rig.rasterizer = Arc::new(StubRasterizer::failing(HostError::Rasterize("tainted".into())));
        let handle = rig.revealed_surface();

        let result = rig.pipeline().export(&handle).await;
        assert!(matches!(
            result,
            ExportResult::Failed {
                error: ExportError::CaptureFailure(_)
            }
        ));
        assert_eq!(rig.document.mount_count(), 1);
        assert_eq!(rig.document.mounted(), 0);
        assert_eq!(rig.notifier.notifications().len(), 1);
        assert!(rig.downloader.saved().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_raster_is_capture_failure() {
        let mut rig = Rig::new(ScriptedShareSheet::unsupported());
        rig.rasterizer = Arc::new(StubRasterizer::empty());
        let handle = rig.revealed_surface();

        let result = rig.pipeline().export(&handle).await;
        assert!(matches!(
            result,
            ExportResult::Failed {
                error: ExportError::CaptureFailure(_)
            }
        ));
        assert_eq!(rig.document.mounted(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn file_share_cancel_is_silent() {
        let rig = Rig::new(ScriptedShareSheet::files(Err(ShareError::Cancelled)));
        let handle = rig.revealed_surface();

        assert_eq!(rig.pipeline().export(&handle).await, ExportResult::Cancelled);
        assert!(rig.notifier.notifications().is_empty());
        assert!(rig.downloader.saved().is_empty());
        assert_eq!(rig.document.mounted(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn file_share_carries_share_text_for_the_year() {
        let rig = Rig::new(ScriptedShareSheet::files(Ok(())));
        let handle = rig.revealed_surface();

        let result = rig.pipeline().export(&handle).await;
        assert!(matches!(result, ExportResult::Delivered(Delivery::SharedFile { .. })));
        let request = &rig.share.requests()[0];
        assert_eq!(request.title, "My tarot prediction for 2026");
        assert_eq!(request.text, "Take a look at my tarot prediction for 2026!");
        assert_eq!(request.file.as_ref().map(|f| f.mime), Some("image/png"));
    }

    #[tokio::test(start_paused = true)]
    async fn download_failure_notifies_once() {
        let mut rig = Rig::new(ScriptedShareSheet::files(Err(ShareError::Failed("denied".into()))));
        rig.downloader = Arc::new(MemoryDownloader::failing());
        let handle = rig.revealed_surface();

        let result = rig.pipeline().export(&handle).await;
        assert!(matches!(
            result,
            ExportResult::Failed {
                error: ExportError::DownloadFailure(_)
            }
        ));
        let notes = rig.notifier.notifications();
        assert_eq!(notes.len(), 1);
        assert!(matches!(notes[0], ExportError::DownloadFailure(_)));
    }

    #[test]
    fn result_serializes_with_result_tag() {
        let json = serde_json::to_value(ExportResult::Failed {
            error: ExportError::NotReady,
        })
        .unwrap();
        assert_eq!(json["result"], "failed");
        assert_eq!(json["error"], "prediction is not visible; reveal the card first");

        let json = serde_json::to_value(ExportResult::Cancelled).unwrap();
        assert_eq!(json["result"], "cancelled");
    }
}
