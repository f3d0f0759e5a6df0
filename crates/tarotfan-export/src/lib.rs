// ABOUTME: Export library for tarotfan: captures a revealed prediction and delivers it as a PNG.
// ABOUTME: Host surfaces are reached only through the adapter traits in `host`.

pub mod capture;
pub mod delivery;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod testing;

pub use delivery::{Cascade, Delivery, DeliveryStrategy, DownloadLink, ImageFile, ShareMessage};
pub use error::{ExportError, HostError, ShareError};
pub use host::{
    AssetLoader, CloneId, Document, Downloader, Notifier, OffscreenPlacement, Raster, RasterOptions,
    Rasterizer, ShareRequest, ShareSheet, SurfaceHandle, SurfaceSnapshot,
};
pub use pipeline::{ExportConfig, ExportHost, ExportPipeline, ExportResult};
