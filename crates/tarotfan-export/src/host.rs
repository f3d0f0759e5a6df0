// ABOUTME: Adapter traits for the host surfaces export touches: document, rasterizer, share, download.
// ABOUTME: The pipeline only talks to these traits; the binary and tests provide implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::delivery::{DownloadLink, ImageFile};
use crate::error::{ExportError, HostError, ShareError};

/// Handle to an exportable subtree, keyed by the card it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceHandle(pub Ulid);

/// Identifies an off-screen clone mounted by `Document::mount_clone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloneId(pub u64);

/// Computed state of an exportable subtree at the moment of export.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSnapshot {
    pub visible: bool,
    pub width: f64,
    pub height: f64,
    /// Computed background colour, e.g. `rgb(15, 142, 255)` or `transparent`.
    pub background_color: Option<String>,
    /// Computed `background-image` value, e.g. `url("/img/bg.svg")` or `none`.
    pub background_image: Option<String>,
}

/// Where a clone is placed so it can be rendered without being seen.
#[derive(Debug, Clone, PartialEq)]
pub struct OffscreenPlacement {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub z_index: i32,
    pub pointer_events: bool,
    /// Visibility and opacity forced on regardless of the source.
    pub force_visible: bool,
}

impl OffscreenPlacement {
    pub fn for_snapshot(snapshot: &SurfaceSnapshot) -> Self {
        Self {
            left: -9999.0,
            top: 0.0,
            width: snapshot.width,
            height: snapshot.height,
            z_index: -9999,
            pointer_events: false,
            force_visible: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterOptions {
    pub scale: f64,
    pub background_color: String,
    pub background_image: Option<String>,
    pub use_cors: bool,
    pub allow_taint: bool,
    pub image_timeout: std::time::Duration,
    /// PNG encoder quality hint in `0.0..=1.0`.
    pub quality: f64,
}

/// An encoded PNG and its pixel size.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

impl Raster {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.png.is_empty()
    }
}

pub trait Document: Send + Sync {
    /// Look up the subtree behind a handle. `None` when it is not mounted.
    fn resolve(&self, handle: &SurfaceHandle) -> Option<SurfaceSnapshot>;

    fn mount_clone(
        &self,
        handle: &SurfaceHandle,
        placement: &OffscreenPlacement,
    ) -> Result<CloneId, HostError>;

    fn unmount_clone(&self, clone: CloneId);

    /// Origin relative asset URLs are resolved against, e.g. `https://example.org`.
    fn origin(&self) -> String;
}

#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(&self, clone: CloneId, options: &RasterOptions) -> Result<Raster, HostError>;
}

#[async_trait]
pub trait AssetLoader: Send + Sync {
    async fn preload(&self, url: &str) -> Result<(), HostError>;
}

/// A native share request. `file` is `None` for a text-only share.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareRequest {
    pub title: String,
    pub text: String,
    pub file: Option<ImageFile>,
}

#[async_trait]
pub trait ShareSheet: Send + Sync {
    /// The host has a native share surface at all.
    fn can_share(&self) -> bool;

    /// The host would accept this file in a share request.
    fn can_share_files(&self, file: &ImageFile) -> bool;

    async fn share(&self, request: ShareRequest) -> Result<(), ShareError>;
}

#[async_trait]
pub trait Downloader: Send + Sync {
    async fn save(&self, link: &DownloadLink) -> Result<(), HostError>;
}

/// User-facing notification surface. Called once per user-visible failure.
pub trait Notifier: Send + Sync {
    fn notify(&self, error: &ExportError);
}
