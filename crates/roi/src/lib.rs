//! # Region-of-interest segmentation
//!
//! Turns a raster image into a list of connected regions, filters and orders
//! them by geometry, and derives new images from them: masks, transparent
//! cut-outs, painted overlays and per-region crops.
//!
//! All pixel numerics sit behind the [`PixelEngine`] trait. The bundled
//! [`ImageprocEngine`] implements it with `image`, `imageproc` and `palette`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roi::{ImageHandle, MaskOrRegions, MaskSpec, RegionFilterSpec, SortKey};
//!
//! let image = ImageHandle::load("cells.png")?;
//! let mask = image.create_mask(&MaskSpec::default())?;
//!
//! let filter = RegionFilterSpec {
//!     min_surface: Some(100.0),
//!     sort_by: Some(SortKey::Surface),
//!     ..Default::default()
//! };
//! for (i, crop) in image.split(MaskOrRegions::Mask(&mask), &filter)?.iter().enumerate() {
//!     crop.save(format!("crops/{i}.png"), &Default::default())?;
//! }
//! # Ok::<(), roi::RoiError>(())
//! ```
//!
//! ## Pipeline
//!
//! ```rust,no_run
//! use roi::{ChannelDerivation, ImageHandle, Pipeline, ThresholdMethod};
//!
//! let pipeline = Pipeline::builder()
//!     .channel(ChannelDerivation::Hue)
//!     .threshold(ThresholdMethod::Otsu)
//!     .build();
//! let image = ImageHandle::load("plate.jpg")?;
//! let segmentation = pipeline.process(&image)?;
//! segmentation.save_geojson("plate.geojson")?;
//! # Ok::<(), roi::RoiError>(())
//! ```

pub mod analysis;
pub mod compositor;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod handle;
pub mod hash;
pub mod io;
pub mod mask_builder;
pub mod options;
pub mod pipeline;
pub mod types;

#[cfg(test)]
mod test_support;

pub use engine::{ImageprocEngine, PixelEngine, RawRegion};
pub use error::{ErrorKind, Result, RoiError};
pub use extractor::{RegionExtractor, RegionSource};
pub use handle::{ImageHandle, MaskOrRegions};
pub use hash::{hash_distance, Fingerprint};
pub use mask_builder::MaskBuilder;
pub use options::{
    ChannelDerivation, Color, ColorOptions, ContrastMode, ContrastOptions, GreyOptions, MaskColor, MaskOptions,
    MaskSpec, PaintOptions, RegionFilterSpec, ResizeMethod, ResizeOptions, ResizeSpec, SaveOptions, SortKey,
    ThresholdMethod,
};
pub use pipeline::{builder::PipelineBuilder, Pipeline, Segmentation};
pub use types::{Region, RegionStats, Span};
