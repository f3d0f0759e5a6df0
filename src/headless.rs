// ABOUTME: Headless host for the binary: an in-memory scene plus file-backed export adapters.
// ABOUTME: Lets a full reading and export run from a terminal with no browser attached.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tarotfan_core::card::{CardGeometry, Rect, Viewport};
use tarotfan_core::render::{Stage, TableView};
use tarotfan_export::{
    AssetLoader, CloneId, Document, DownloadLink, Downloader, ExportError, HostError, ImageFile,
    Notifier, OffscreenPlacement, Raster, RasterOptions, Rasterizer, ShareError, ShareRequest,
    ShareSheet, SurfaceHandle, SurfaceSnapshot,
};
use ulid::Ulid;

use crate::config::ShareMode;

const CARD_WIDTH: f64 = 120.0;
const CARD_HEIGHT: f64 = 200.0;
/// Horizontal spacing and rotation step between neighbouring fan slots.
const FAN_STEP_X: f64 = 42.0;
const FAN_STEP_DEG: f64 = 8.0;
const DETAIL_WIDTH: f64 = 300.0;
const DETAIL_HEIGHT: f64 = 480.0;
const DETAIL_BACKGROUND: &str = "rgb(15, 142, 255)";
const DETAIL_ARTWORK: &str = r#"url("/img/bg_2.svg")"#;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// In-memory stand-in for the page: keeps the last rendered table, lays
/// the hand out as a fan, and hosts export clones.
#[derive(Debug)]
pub struct Scene {
    viewport: Viewport,
    origin: String,
    view: Mutex<Option<TableView>>,
    clones: Mutex<HashMap<CloneId, OffscreenPlacement>>,
    next_clone: AtomicU64,
}

impl Scene {
    pub fn new(viewport: Viewport, origin: &str) -> Self {
        Self {
            viewport,
            origin: origin.to_owned(),
            view: Mutex::new(None),
            clones: Mutex::new(HashMap::new()),
            next_clone: AtomicU64::new(1),
        }
    }

    /// A phone-sized portrait viewport.
    pub fn phone() -> Self {
        Self::new(
            Viewport {
                width: 390.0,
                height: 844.0,
            },
            "http://localhost",
        )
    }

    pub fn placement(&self, clone: CloneId) -> Option<OffscreenPlacement> {
        lock(&self.clones).get(&clone).cloned()
    }

    pub fn mounted_clones(&self) -> usize {
        lock(&self.clones).len()
    }

    /// Fan slot geometry for position `index` of a hand of `len`.
    fn fan_slot(&self, index: usize, len: usize) -> CardGeometry {
        let offset = index as f64 - (len.saturating_sub(1)) as f64 / 2.0;
        let center_x = self.viewport.width / 2.0 + offset * FAN_STEP_X;
        CardGeometry {
            rect: Rect {
                left: center_x - CARD_WIDTH / 2.0,
                top: self.viewport.height - CARD_HEIGHT - 60.0 + offset.abs() * 6.0,
                width: CARD_WIDTH,
                height: CARD_HEIGHT,
            },
            rotation_deg: offset * FAN_STEP_DEG,
        }
    }
}

impl Stage for Scene {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn capture_geometry(&self, instance_id: Ulid) -> Option<CardGeometry> {
        let view = lock(&self.view);
        let cards = &view.as_ref()?.cards;
        let index = cards.iter().position(|card| card.instance_id == instance_id)?;
        Some(self.fan_slot(index, cards.len()))
    }

    fn render(&self, view: &TableView) {
        tracing::trace!(fan = ?view.fan_classes, "scene rendered");
        *lock(&self.view) = Some(view.clone());
    }
}

impl Document for Scene {
    fn resolve(&self, handle: &SurfaceHandle) -> Option<SurfaceSnapshot> {
        let view = lock(&self.view);
        let card = view
            .as_ref()?
            .cards
            .iter()
            .find(|card| card.instance_id == handle.0)?;
        Some(SurfaceSnapshot {
            visible: card.detail_visible(),
            width: DETAIL_WIDTH,
            height: DETAIL_HEIGHT,
            background_color: Some(DETAIL_BACKGROUND.to_owned()),
            background_image: Some(DETAIL_ARTWORK.to_owned()),
        })
    }

    fn mount_clone(
        &self,
        handle: &SurfaceHandle,
        placement: &OffscreenPlacement,
    ) -> Result<CloneId, HostError> {
        if self.resolve(handle).is_none() {
            return Err(HostError::SurfaceNotFound);
        }
        let id = CloneId(self.next_clone.fetch_add(1, Ordering::SeqCst));
        lock(&self.clones).insert(id, placement.clone());
        Ok(id)
    }

    fn unmount_clone(&self, clone: CloneId) {
        lock(&self.clones).remove(&clone);
    }

    fn origin(&self) -> String {
        self.origin.clone()
    }
}

/// Parse `#rrggbb` or `rgb(r, g, b)` / `rgba(r, g, b, a)` into RGB bytes.
pub fn parse_color(color: &str) -> Option<[u8; 3]> {
    let color = color.trim();
    if let Some(hex) = color.strip_prefix('#') {
        if hex.len() != 6 {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        return Some([channel(0)?, channel(2)?, channel(4)?]);
    }
    let inner = color
        .strip_prefix("rgba(")
        .or_else(|| color.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    let mut channels = inner.split(',').map(|part| part.trim().parse::<u8>().ok());
    Some([channels.next()??, channels.next()??, channels.next()??])
}

/// Renders a clone as a solid PNG in its background colour.
pub struct PngRasterizer {
    scene: Arc<Scene>,
}

impl PngRasterizer {
    pub fn new(scene: Arc<Scene>) -> Self {
        Self { scene }
    }
}

#[async_trait]
impl Rasterizer for PngRasterizer {
    async fn rasterize(&self, clone: CloneId, options: &RasterOptions) -> Result<Raster, HostError> {
        let placement = self
            .scene
            .placement(clone)
            .ok_or_else(|| HostError::Rasterize(format!("clone {} is not mounted", clone.0)))?;
        let width = (placement.width * options.scale).round() as u32;
        let height = (placement.height * options.scale).round() as u32;
        let rgb = parse_color(&options.background_color)
            .ok_or_else(|| HostError::Rasterize(format!("unsupported colour {}", options.background_color)))?;

        let png = encode_solid_png(width, height, rgb, options.quality)
            .map_err(|e| HostError::Rasterize(e.to_string()))?;
        Ok(Raster { width, height, png })
    }
}

fn encode_solid_png(width: u32, height: u32, rgb: [u8; 3], quality: f64) -> Result<Vec<u8>, png::EncodingError> {
    let pixels: Vec<u8> = rgb
        .iter()
        .copied()
        .cycle()
        .take(width as usize * height as usize * 3)
        .collect();

    let mut bytes = Vec::new();
    let mut encoder = png::Encoder::new(&mut bytes, width, height);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(if quality >= 0.9 {
        png::Compression::Best
    } else {
        png::Compression::Default
    });
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&pixels)?;
    writer.finish()?;
    Ok(bytes)
}

/// Assets are served locally, so there is nothing to wait for.
pub struct LocalAssetLoader;

#[async_trait]
impl AssetLoader for LocalAssetLoader {
    async fn preload(&self, url: &str) -> Result<(), HostError> {
        tracing::debug!(%url, "asset preloaded");
        Ok(())
    }
}

/// A share sheet that accepts every request its mode allows.
pub struct ScriptedShare {
    mode: ShareMode,
}

impl ScriptedShare {
    pub fn new(mode: ShareMode) -> Self {
        Self { mode }
    }
}

#[async_trait]
impl ShareSheet for ScriptedShare {
    fn can_share(&self) -> bool {
        self.mode != ShareMode::None
    }

    fn can_share_files(&self, _file: &ImageFile) -> bool {
        self.mode == ShareMode::Files
    }

    async fn share(&self, request: ShareRequest) -> Result<(), ShareError> {
        if self.mode == ShareMode::None {
            return Err(ShareError::Failed("share is not supported".to_owned()));
        }
        tracing::info!(
            title = %request.title,
            file = request.file.as_ref().map(|f| f.name.as_str()),
            "shared"
        );
        Ok(())
    }
}

/// Saves downloads into a directory, decoding the inline data URL.
pub struct FsDownloader {
    dir: PathBuf,
}

impl FsDownloader {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl Downloader for FsDownloader {
    async fn save(&self, link: &DownloadLink) -> Result<(), HostError> {
        if link.file_name.contains(['/', '\\']) || link.file_name.starts_with('.') {
            return Err(HostError::Download(format!("refusing file name {}", link.file_name)));
        }
        let bytes = link
            .decode()
            .ok_or_else(|| HostError::Download("malformed data URL".to_owned()))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| HostError::Download(e.to_string()))?;
        let path = self.dir.join(&link.file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| HostError::Download(e.to_string()))?;
        tracing::info!(path = %path.display(), "prediction saved");
        Ok(())
    }
}

/// Surfaces user-visible export failures on the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, error: &ExportError) {
        tracing::warn!(%error, "could not export prediction");
    }
}
