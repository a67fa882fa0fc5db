use std::{
    fmt::Write as _,
    fs::{self, File},
    io::BufWriter,
    path::Path,
};

use image::{
    codecs::{gif::GifEncoder, jpeg::JpegEncoder},
    DynamicImage, Frame, ImageFormat,
};
use tracing::debug;

use crate::{
    error::{Result, RoiError},
    options::SaveOptions,
};

/// Collapse any decoded colour type onto 8-bit grey, RGB or RGBA.
pub(crate) fn normalize(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image,
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
            DynamicImage::ImageLuma8(image.to_luma8())
        }
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

pub(crate) fn load_path(path: &Path) -> Result<DynamicImage> {
    let image = image::open(path)?;
    debug!(path = %path.display(), width = image.width(), height = image.height(), "decoded image");
    Ok(normalize(image))
}

pub(crate) fn load_encoded(bytes: &[u8]) -> Result<DynamicImage> {
    Ok(normalize(image::load_from_memory(bytes)?))
}

/// Encodings reachable through [`save`], chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Image(ImageFormat),
    Pgm,
    Jpeg,
    Gif,
    Text,
    Raw,
}

fn target_for(path: &Path) -> Result<Target> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    Ok(match extension.as_str() {
        "png" => Target::Image(ImageFormat::Png),
        "bmp" => Target::Image(ImageFormat::Bmp),
        "tif" | "tiff" => Target::Image(ImageFormat::Tiff),
        "pgm" => Target::Pgm,
        "jpg" | "jpeg" => Target::Jpeg,
        "gif" => Target::Gif,
        "txt" => Target::Text,
        "raw" => Target::Raw,
        other => {
            return Err(RoiError::EngineFailure(format!(
                "cannot encode `{}`: unsupported format `{other}`",
                path.display()
            )));
        }
    })
}

/// Encode `image` to `path`. The format is resolved before anything is
/// created on disk.
pub(crate) fn save(image: &DynamicImage, path: &Path, options: &SaveOptions) -> Result<()> {
    let target = target_for(path)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    match target {
        Target::Image(format) => image.save_with_format(path, format)?,
        Target::Pgm => DynamicImage::ImageLuma8(image.to_luma8()).save_with_format(path, ImageFormat::Pnm)?,
        Target::Jpeg => {
            let opaque = match image {
                DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image.clone(),
                other => DynamicImage::ImageRgb8(other.to_rgb8()),
            };
            let writer = BufWriter::new(File::create(path)?);
            let quality = options.quality.clamp(1, 100);
            opaque.write_with_encoder(JpegEncoder::new_with_quality(writer, quality))?;
        }
        Target::Gif => {
            let writer = BufWriter::new(File::create(path)?);
            let mut encoder = GifEncoder::new(writer);
            encoder.encode_frame(Frame::new(image.to_rgba8()))?;
        }
        Target::Text => fs::write(path, text_table(image))?,
        Target::Raw => fs::write(path, image.as_bytes())?,
    }
    debug!(path = %path.display(), format = ?target, "saved image");
    Ok(())
}

/// Grey values as tab-separated rows.
fn text_table(image: &DynamicImage) -> String {
    let grey = image.to_luma8();
    let mut out = String::with_capacity((grey.width() * grey.height() * 4) as usize);
    for row in grey.rows() {
        for (i, pixel) in row.enumerate() {
            if i > 0 {
                out.push('\t');
            }
            let _ = write!(out, "{}", pixel.0[0]);
        }
        out.push('\n');
    }
    out
}
