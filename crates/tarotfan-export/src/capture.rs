// ABOUTME: Off-screen capture of an exportable subtree into a PNG raster.
// ABOUTME: Mounts a clone, waits for styles and the background asset, rasterizes, and always unmounts.

use crate::error::ExportError;
use crate::host::{
    AssetLoader, CloneId, Document, OffscreenPlacement, Raster, RasterOptions, Rasterizer,
    SurfaceHandle, SurfaceSnapshot,
};
use crate::pipeline::ExportConfig;

/// Owns a mounted clone and unmounts it when dropped, on every exit path.
struct CloneGuard<'a> {
    document: &'a dyn Document,
    id: CloneId,
}

impl Drop for CloneGuard<'_> {
    fn drop(&mut self) {
        self.document.unmount_clone(self.id);
        tracing::debug!(clone = self.id.0, "export clone removed");
    }
}

/// Extract the target of the first `url(...)` in a CSS value. Quotes are
/// optional; a quoted target runs to its closing quote.
pub fn css_url(value: &str) -> Option<&str> {
    let start = value.find("url(")? + "url(".len();
    let rest = value[start..].trim_start();
    let inner = match rest.chars().next()? {
        quote @ ('"' | '\'') => {
            let quoted = &rest[1..];
            &quoted[..quoted.find(quote)?]
        }
        _ => rest[..rest.find(')')?].trim(),
    };
    (!inner.is_empty()).then_some(inner)
}

/// Resolve an asset URL against the document origin. Absolute, data and
/// blob URLs are returned unchanged.
pub fn resolve_asset_url(origin: &str, url: &str) -> String {
    const ABSOLUTE: [&str; 4] = ["http://", "https://", "data:", "blob:"];
    if ABSOLUTE.iter().any(|scheme| url.starts_with(scheme)) {
        return url.to_string();
    }
    let origin = origin.trim_end_matches('/');
    let path = url.trim_start_matches("./");
    if path.starts_with('/') {
        format!("{origin}{path}")
    } else {
        format!("{origin}/{path}")
    }
}

fn is_transparent(color: &str) -> bool {
    let normalized: String = color.chars().filter(|c| !c.is_whitespace()).collect();
    normalized.eq_ignore_ascii_case("transparent") || normalized == "rgba(0,0,0,0)"
}

/// Rasterizer options for a snapshot: the computed background colour
/// unless it is transparent, otherwise the configured fallback.
pub fn raster_options(snapshot: &SurfaceSnapshot, config: &ExportConfig) -> RasterOptions {
    let background_color = match snapshot.background_color.as_deref() {
        Some(color) if !color.trim().is_empty() && !is_transparent(color) => color.to_string(),
        _ => config.fallback_background.clone(),
    };
    let background_image = snapshot
        .background_image
        .clone()
        .filter(|image| image.trim() != "none" && !image.trim().is_empty());

    RasterOptions {
        scale: config.scale,
        background_color,
        background_image,
        use_cors: true,
        allow_taint: false,
        image_timeout: config.image_timeout,
        quality: config.quality,
    }
}

pub(crate) async fn capture(
    document: &dyn Document,
    rasterizer: &dyn Rasterizer,
    assets: &dyn AssetLoader,
    handle: &SurfaceHandle,
    snapshot: &SurfaceSnapshot,
    config: &ExportConfig,
) -> Result<Raster, ExportError> {
    let placement = OffscreenPlacement::for_snapshot(snapshot);
    let id = document
        .mount_clone(handle, &placement)
        .map_err(|e| ExportError::CaptureFailure(e.to_string()))?;
    let clone = CloneGuard { document, id };

    tokio::time::sleep(config.settle).await;

    if let Some(url) = snapshot.background_image.as_deref().and_then(css_url) {
        let url = resolve_asset_url(&document.origin(), url);
        match tokio::time::timeout(config.asset_timeout, assets.preload(&url)).await {
            Ok(Ok(())) => tracing::debug!(%url, "background asset ready"),
            Ok(Err(e)) => tracing::warn!(%url, error = %e, "background asset failed to load, continuing"),
            Err(_) => tracing::warn!(%url, "background asset load timed out, continuing"),
        }
    }

    let options = raster_options(snapshot, config);
    let raster = rasterizer
        .rasterize(clone.id, &options)
        .await
        .map_err(|e| ExportError::CaptureFailure(e.to_string()))?;

    if raster.is_empty() {
        return Err(ExportError::CaptureFailure("rasterizer produced an empty image".into()));
    }
    tracing::debug!(width = raster.width, height = raster.height, "prediction captured");
    Ok(raster)
}
