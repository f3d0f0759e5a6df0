// ABOUTME: Test utilities for tarotfan-export: in-memory host adapters with scripted behaviour.
// ABOUTME: Used in tests to drive the pipeline and cascade without a browser or filesystem.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::delivery::{DownloadLink, ImageFile};
use crate::error::{ExportError, HostError, ShareError};
use crate::host::{
    AssetLoader, CloneId, Document, Downloader, Notifier, OffscreenPlacement, Raster, RasterOptions,
    Rasterizer, ShareRequest, ShareSheet, SurfaceHandle, SurfaceSnapshot,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A document whose surfaces are inserted by the test. Tracks mounted
/// clones so tests can check that none are left behind.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    origin: String,
    surfaces: Mutex<HashMap<SurfaceHandle, SurfaceSnapshot>>,
    clones: Mutex<Vec<CloneId>>,
    next_clone: AtomicU64,
    mounts: AtomicU64,
}

impl MemoryDocument {
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.to_owned(),
            ..Self::default()
        }
    }

    /// A revealed prediction with the stock blue background and artwork.
    pub fn visible_snapshot() -> SurfaceSnapshot {
        SurfaceSnapshot {
            visible: true,
            width: 300.0,
            height: 480.0,
            background_color: Some("rgb(15, 142, 255)".to_owned()),
            background_image: Some(r#"url("/img/bg_2.svg")"#.to_owned()),
        }
    }

    pub fn insert(&self, handle: SurfaceHandle, snapshot: SurfaceSnapshot) {
        lock(&self.surfaces).insert(handle, snapshot);
    }

    /// Clones mounted so far, including removed ones.
    pub fn mount_count(&self) -> u64 {
        self.mounts.load(Ordering::SeqCst)
    }

    /// Clones currently mounted.
    pub fn mounted(&self) -> usize {
        lock(&self.clones).len()
    }
}

impl Document for MemoryDocument {
    fn resolve(&self, handle: &SurfaceHandle) -> Option<SurfaceSnapshot> {
        lock(&self.surfaces).get(handle).cloned()
    }

    fn mount_clone(
        &self,
        handle: &SurfaceHandle,
        _placement: &OffscreenPlacement,
    ) -> Result<CloneId, HostError> {
        if !lock(&self.surfaces).contains_key(handle) {
            return Err(HostError::SurfaceNotFound);
        }
        let id = CloneId(self.next_clone.fetch_add(1, Ordering::SeqCst));
        self.mounts.fetch_add(1, Ordering::SeqCst);
        lock(&self.clones).push(id);
        Ok(id)
    }

    fn unmount_clone(&self, clone: CloneId) {
        lock(&self.clones).retain(|id| *id != clone);
    }

    fn origin(&self) -> String {
        self.origin.clone()
    }
}

/// A rasterizer that returns a fixed PNG, an empty image, or an error.
#[derive(Debug)]
pub struct StubRasterizer {
    result: Result<Raster, HostError>,
    last_options: Mutex<Option<RasterOptions>>,
}

impl StubRasterizer {
    /// PNG signature; enough bytes for tests to compare.
    pub const PNG: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

    fn with(result: Result<Raster, HostError>) -> Self {
        Self {
            result,
            last_options: Mutex::new(None),
        }
    }

    pub fn ok() -> Self {
        Self::with(Ok(Raster {
            width: 600,
            height: 960,
            png: Self::PNG.to_vec(),
        }))
    }

    pub fn empty() -> Self {
        Self::with(Ok(Raster {
            width: 0,
            height: 0,
            png: Vec::new(),
        }))
    }

    pub fn failing(error: HostError) -> Self {
        Self::with(Err(error))
    }

    pub fn last_options(&self) -> Option<RasterOptions> {
        lock(&self.last_options).clone()
    }
}

#[async_trait]
impl Rasterizer for StubRasterizer {
    async fn rasterize(&self, _clone: CloneId, options: &RasterOptions) -> Result<Raster, HostError> {
        *lock(&self.last_options) = Some(options.clone());
        self.result.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssetBehaviour {
    Ready,
    Failing,
    Hanging,
}

/// An asset loader that records requested URLs.
#[derive(Debug)]
pub struct StubAssetLoader {
    behaviour: AssetBehaviour,
    requested: Mutex<Vec<String>>,
}

impl StubAssetLoader {
    fn with(behaviour: AssetBehaviour) -> Self {
        Self {
            behaviour,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn ready() -> Self {
        Self::with(AssetBehaviour::Ready)
    }

    pub fn failing() -> Self {
        Self::with(AssetBehaviour::Failing)
    }

    /// Never finishes loading.
    pub fn hanging() -> Self {
        Self::with(AssetBehaviour::Hanging)
    }

    pub fn requested(&self) -> Vec<String> {
        lock(&self.requested).clone()
    }
}

#[async_trait]
impl AssetLoader for StubAssetLoader {
    async fn preload(&self, url: &str) -> Result<(), HostError> {
        lock(&self.requested).push(url.to_owned());
        match self.behaviour {
            AssetBehaviour::Ready => Ok(()),
            AssetBehaviour::Failing => Err(HostError::AssetLoad(format!("404 for {url}"))),
            AssetBehaviour::Hanging => std::future::pending().await,
        }
    }
}

/// A share sheet with fixed capabilities and a scripted answer.
#[derive(Debug)]
pub struct ScriptedShareSheet {
    can_share: bool,
    can_share_files: bool,
    answer: Result<(), ShareError>,
    requests: Mutex<Vec<ShareRequest>>,
}

impl ScriptedShareSheet {
    pub fn new(can_share: bool, can_share_files: bool, answer: Result<(), ShareError>) -> Self {
        Self {
            can_share,
            can_share_files,
            answer,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Shares files and answers every request with `answer`.
    pub fn files(answer: Result<(), ShareError>) -> Self {
        Self::new(true, true, answer)
    }

    /// Shares text but refuses files.
    pub fn text_only(answer: Result<(), ShareError>) -> Self {
        Self::new(true, false, answer)
    }

    /// No share surface at all, like most desktop browsers.
    pub fn unsupported() -> Self {
        Self::new(false, false, Err(ShareError::Failed("share unsupported".to_owned())))
    }

    pub fn requests(&self) -> Vec<ShareRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl ShareSheet for ScriptedShareSheet {
    fn can_share(&self) -> bool {
        self.can_share
    }

    fn can_share_files(&self, _file: &ImageFile) -> bool {
        self.can_share_files
    }

    async fn share(&self, request: ShareRequest) -> Result<(), ShareError> {
        lock(&self.requests).push(request);
        self.answer.clone()
    }
}

/// A downloader that keeps every link in memory, or refuses them all.
#[derive(Debug, Default)]
pub struct MemoryDownloader {
    fail: bool,
    saved: Mutex<Vec<DownloadLink>>,
}

impl MemoryDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn saved(&self) -> Vec<DownloadLink> {
        lock(&self.saved).clone()
    }
}

#[async_trait]
impl Downloader for MemoryDownloader {
    async fn save(&self, link: &DownloadLink) -> Result<(), HostError> {
        if self.fail {
            return Err(HostError::Download("storage unavailable".to_owned()));
        }
        lock(&self.saved).push(link.clone());
        Ok(())
    }
}

/// A notifier that remembers what it was told.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<ExportError>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<ExportError> {
        lock(&self.notifications).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, error: &ExportError) {
        lock(&self.notifications).push(error.clone());
    }
}
