//! Configuration records, one per operation.
//!
//! Enumerated options parse from the names used by the scripting API
//! (`"Otsu"`, `"IJ_IsoData"`, `"hue"`, `"b/w"`, ...). An unrecognized name is
//! reported as [`RoiError::InvalidOption`](crate::RoiError::InvalidOption)
//! before any pixel work starts.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::error::{parse_option, Result, RoiError};

/// Automatic threshold selection methods.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum ThresholdMethod {
    #[default]
    Default,
    Huang,
    #[strum(serialize = "IJ_IsoData")]
    #[serde(rename = "IJ_IsoData")]
    IjIsoData,
    Intermodes,
    IsoData,
    Li,
    MaxEntropy,
    Mean,
    MinError,
    Minimum,
    Moments,
    Otsu,
    Percentile,
    RenyiEntropy,
    Shanbhag,
    Triangle,
    Yen,
}

/// Which single-channel image a mask is computed on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ChannelDerivation {
    #[default]
    None,
    Red,
    Green,
    Blue,
    Hue,
    Saturation,
    Brightness,
    Edge,
    #[strum(serialize = "grey", serialize = "gray")]
    #[serde(alias = "gray")]
    Grey,
    Texture,
}

/// How the pixels of a freshly built mask are rendered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum MaskColor {
    /// Foreground painted pure red over the greyscale input.
    #[default]
    Red,
    /// Foreground white, background black.
    #[strum(serialize = "blackwhite", serialize = "b/w")]
    #[serde(alias = "b/w")]
    BlackWhite,
    /// Input pixels left untouched; only the stencil marks the foreground.
    Original,
}

/// Sort order for extracted regions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    X,
    Y,
    /// Row first, then column.
    Xy,
    Length,
    Surface,
}

/// Mask configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct MaskSpec {
    pub channel_derivation: ChannelDerivation,
    pub threshold_method: ThresholdMethod,
    pub dark_background: bool,
    pub mask_color: MaskColor,
}

impl Default for MaskSpec {
    fn default() -> Self {
        Self {
            channel_derivation: ChannelDerivation::None,
            threshold_method: ThresholdMethod::Default,
            dark_background: true,
            mask_color: MaskColor::Red,
        }
    }
}

/// Loosely typed mask options as supplied by scripts and job files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MaskOptions {
    /// Threshold method name, e.g. `"Otsu"`.
    pub method: Option<String>,
    pub dark_background: Option<bool>,
    /// `"red"`, `"b/w"` or `"original"`.
    pub mask_color: Option<String>,
    /// Channel derivation name, e.g. `"hue"`.
    pub image_filter: Option<String>,
}

impl TryFrom<&MaskOptions> for MaskSpec {
    type Error = RoiError;

    fn try_from(options: &MaskOptions) -> Result<Self> {
        let defaults = MaskSpec::default();
        Ok(Self {
            channel_derivation: match &options.image_filter {
                Some(name) => parse_option("imageFilter", name)?,
                None => defaults.channel_derivation,
            },
            threshold_method: match &options.method {
                Some(name) => parse_option("method", name)?,
                None => defaults.threshold_method,
            },
            dark_background: options.dark_background.unwrap_or(defaults.dark_background),
            mask_color: match &options.mask_color {
                Some(name) => parse_option("maskColor", name)?,
                None => defaults.mask_color,
            },
        })
    }
}

impl TryFrom<MaskOptions> for MaskSpec {
    type Error = RoiError;

    fn try_from(options: MaskOptions) -> Result<Self> {
        MaskSpec::try_from(&options)
    }
}

/// Geometric filter and ordering applied to extracted regions.
///
/// Every bound is optional and inclusive; an absent bound leaves that side
/// unbounded. `length` is the longer side of the bounding box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RegionFilterSpec {
    pub min_length: Option<f64>,
    pub max_length: Option<f64>,
    pub min_width: Option<f64>,
    pub max_width: Option<f64>,
    pub min_height: Option<f64>,
    pub max_height: Option<f64>,
    pub min_surface: Option<f64>,
    pub max_surface: Option<f64>,
    /// Multiplier applied to each region before filtering.
    pub scale: Option<f64>,
    /// `None` keeps extraction order.
    pub sort_by: Option<SortKey>,
}

impl RegionFilterSpec {
    pub fn sorted_by(mut self, key: SortKey) -> Self {
        self.sort_by = Some(key);
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Reject a scale factor that is not finite and positive.
    pub fn validate(&self) -> Result<()> {
        if let Some(scale) = self.scale
            && !(scale.is_finite() && scale > 0.0)
        {
            return Err(RoiError::invalid("scale", scale));
        }
        Ok(())
    }
}

/// An opaque RGB colour, parsed from a name or `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(pub [u8; 3]);

impl Color {
    pub const RED: Color = Color([255, 0, 0]);
}

impl FromStr for Color {
    type Err = RoiError;

    fn from_str(value: &str) -> Result<Self> {
        let name = value.trim().to_ascii_lowercase();
        let rgb = match name.as_str() {
            "red" => [255, 0, 0],
            "green" => [0, 255, 0],
            "blue" => [0, 0, 255],
            "yellow" => [255, 255, 0],
            "cyan" => [0, 255, 255],
            "magenta" => [255, 0, 255],
            "orange" => [255, 200, 0],
            "pink" => [255, 175, 175],
            "white" => [255, 255, 255],
            "black" => [0, 0, 0],
            "gray" | "grey" => [128, 128, 128],
            hex if hex.len() == 7 && hex.is_ascii() && hex.starts_with('#') => {
                let channel = |range: std::ops::Range<usize>| {
                    u8::from_str_radix(&hex[range], 16).map_err(|_| RoiError::invalid("color", value))
                };
                [channel(1..3)?, channel(3..5)?, channel(5..7)?]
            }
            _ => return Err(RoiError::invalid("color", value)),
        };
        Ok(Color(rgb))
    }
}

impl TryFrom<String> for Color {
    type Error = RoiError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

/// Stroke and fill styling for painted overlays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PaintOptions {
    #[schemars(with = "String")]
    pub stroke_color: Color,
    pub stroke_size: u32,
    #[schemars(with = "Option<String>")]
    pub fill_color: Option<Color>,
}

impl Default for PaintOptions {
    fn default() -> Self {
        Self {
            stroke_color: Color::RED,
            stroke_size: 3,
            fill_color: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SaveOptions {
    /// JPEG quality, 0..=100.
    pub quality: u8,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { quality: 100 }
    }
}

/// Target size for a resize: `"200x100"`, `"200x"`, `"x100"` or `"50%"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResizeSpec {
    Exact { width: u32, height: u32 },
    Width(u32),
    Height(u32),
    Percent(f64),
}

impl ResizeSpec {
    /// Resolve to concrete dimensions for a `width` x `height` source,
    /// preserving the aspect ratio when one side is open.
    pub fn target(&self, width: u32, height: u32) -> Result<(u32, u32)> {
        let (w, h) = match *self {
            Self::Exact { width, height } => (width, height),
            Self::Width(w) => (w, (w as f64 * height as f64 / width as f64) as u32),
            Self::Height(h) => ((h as f64 * width as f64 / height as f64) as u32, h),
            Self::Percent(p) => {
                let factor = p / 100.0;
                ((width as f64 * factor) as u32, (height as f64 * factor) as u32)
            }
        };
        if w == 0 || h == 0 {
            return Err(RoiError::invalid("size", format!("{self} resolves to {w}x{h}")));
        }
        Ok((w, h))
    }
}

impl FromStr for ResizeSpec {
    type Err = RoiError;

    fn from_str(value: &str) -> Result<Self> {
        let size = value.trim().to_ascii_lowercase();
        let invalid = || RoiError::invalid("size", value);

        if let Some(percent) = size.strip_suffix('%') {
            let p: f64 = percent.trim().parse().map_err(|_| invalid())?;
            if !(p.is_finite() && p > 0.0) {
                return Err(invalid());
            }
            return Ok(Self::Percent(p));
        }

        let (w, h) = size.split_once('x').ok_or_else(invalid)?;
        let parse = |side: &str| -> Result<Option<u32>> {
            let side = side.trim();
            if side.is_empty() {
                return Ok(None);
            }
            side.parse::<u32>().map(Some).map_err(|_| invalid())
        };
        match (parse(w)?, parse(h)?) {
            (Some(width), Some(height)) if width > 0 && height > 0 => Ok(Self::Exact { width, height }),
            (Some(width), None) if width > 0 => Ok(Self::Width(width)),
            (None, Some(height)) if height > 0 => Ok(Self::Height(height)),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for ResizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact { width, height } => write!(f, "{width}x{height}"),
            Self::Width(w) => write!(f, "{w}x"),
            Self::Height(h) => write!(f, "x{h}"),
            Self::Percent(p) => write!(f, "{p}%"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMethod {
    None,
    #[default]
    Bilinear,
    Bicubic,
}

impl TryFrom<u8> for ResizeMethod {
    type Error = RoiError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Bilinear),
            2 => Ok(Self::Bicubic),
            other => Err(RoiError::invalid("method", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ResizeOptions {
    pub method: ResizeMethod,
    /// Average source pixels when downsizing.
    pub average: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ContrastOptions {
    pub equalize: bool,
    /// Percentage of saturated pixels for a histogram stretch, in (0, 100].
    pub saturated: f64,
}

impl Default for ContrastOptions {
    fn default() -> Self {
        Self {
            equalize: true,
            saturated: 0.0,
        }
    }
}

/// What [`ContrastOptions`] resolves to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContrastMode {
    Equalize,
    Stretch { saturated: f64 },
}

impl ContrastOptions {
    pub fn mode(&self) -> Result<ContrastMode> {
        if self.equalize && self.saturated == 0.0 {
            Ok(ContrastMode::Equalize)
        } else if self.saturated > 0.0 && self.saturated <= 100.0 {
            Ok(ContrastMode::Stretch {
                saturated: self.saturated,
            })
        } else {
            Err(RoiError::invalid("saturated", self.saturated))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct GreyOptions {
    /// Number of grey levels, 2..=256.
    #[serde(alias = "nbGrey")]
    pub levels: u16,
}

impl Default for GreyOptions {
    fn default() -> Self {
        Self { levels: 256 }
    }
}

impl From<u16> for GreyOptions {
    fn from(levels: u16) -> Self {
        Self { levels }
    }
}

impl GreyOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if (2..=256).contains(&self.levels) {
            Ok(())
        } else {
            Err(RoiError::invalid("nbGrey", self.levels))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorOptions {
    /// Number of colours, 2..=256.
    #[serde(alias = "nbColor")]
    pub colors: u16,
}

impl Default for ColorOptions {
    fn default() -> Self {
        Self { colors: 256 }
    }
}

impl From<u16> for ColorOptions {
    fn from(colors: u16) -> Self {
        Self { colors }
    }
}

impl ColorOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if (2..=256).contains(&self.colors) {
            Ok(())
        } else {
            Err(RoiError::invalid("nbColor", self.colors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn threshold_method_names_round_trip() {
        use strum::IntoEnumIterator;

        assert_eq!(ThresholdMethod::VARIANTS.len(), 17);
        for method in ThresholdMethod::iter() {
            let name = method.to_string();
            assert_eq!(name.parse::<ThresholdMethod>().unwrap(), method);
        }
        assert_eq!("IJ_IsoData".parse::<ThresholdMethod>().unwrap(), ThresholdMethod::IjIsoData);
        assert_eq!("otsu".parse::<ThresholdMethod>().unwrap(), ThresholdMethod::Otsu);
    }

    #[test]
    fn mask_options_parse_into_spec() {
        let options: MaskOptions = serde_json::from_str(
            r#"{"method":"Li","darkBackground":false,"maskColor":"b/w","imageFilter":"hue"}"#,
        )
        .unwrap();
        let spec = MaskSpec::try_from(options).unwrap();
        assert_eq!(spec.threshold_method, ThresholdMethod::Li);
        assert!(!spec.dark_background);
        assert_eq!(spec.mask_color, MaskColor::BlackWhite);
        assert_eq!(spec.channel_derivation, ChannelDerivation::Hue);
    }

    #[test]
    fn unknown_names_are_invalid_options() {
        let bad_method = MaskOptions {
            method: Some("Sauvola".into()),
            ..Default::default()
        };
        let err = MaskSpec::try_from(bad_method).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOption);

        let bad_filter = MaskOptions {
            image_filter: Some("ultraviolet".into()),
            ..Default::default()
        };
        let err = MaskSpec::try_from(bad_filter).unwrap_err();
        assert!(matches!(err, RoiError::InvalidOption { option: "imageFilter", .. }));
    }

    #[test]
    fn filter_spec_uses_camel_case_keys() {
        let filter: RegionFilterSpec =
            serde_json::from_str(r#"{"minSurface":100,"sortBy":"xy","scale":1.5}"#).unwrap();
        assert_eq!(filter.min_surface, Some(100.0));
        assert_eq!(filter.sort_by, Some(SortKey::Xy));
        assert_eq!(filter.scale, Some(1.5));
        assert!(filter.max_surface.is_none());
    }

    #[test]
    fn non_positive_scale_is_rejected() {
        assert!(RegionFilterSpec::default().with_scale(0.0).validate().is_err());
        assert!(RegionFilterSpec::default().with_scale(f64::NAN).validate().is_err());
        assert!(RegionFilterSpec::default().with_scale(0.5).validate().is_ok());
    }

    #[test]
    fn colors_parse_from_names_and_hex() {
        assert_eq!("Red".parse::<Color>().unwrap(), Color::RED);
        assert_eq!("#10ff00".parse::<Color>().unwrap(), Color([16, 255, 0]));
        assert!("chartreuse-ish".parse::<Color>().is_err());
        assert_eq!(Color([1, 2, 3]).to_string(), "#010203");
    }

    #[test]
    fn non_ascii_hex_is_an_invalid_option() {
        // seven bytes, but 'é' straddles the channel boundaries
        for value in ["#aé000", "#ééé", "#12345é"] {
            let err = value.parse::<Color>().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidOption, "{value}");
        }
        let from_json = serde_json::from_str::<PaintOptions>(r##"{"strokeColor":"#aé000"}"##);
        assert!(from_json.is_err());
    }

    #[test]
    fn resize_spec_forms() {
        assert_eq!("200x100".parse::<ResizeSpec>().unwrap().target(50, 50).unwrap(), (200, 100));
        assert_eq!("200x".parse::<ResizeSpec>().unwrap().target(100, 50).unwrap(), (200, 100));
        assert_eq!("x25".parse::<ResizeSpec>().unwrap().target(100, 50).unwrap(), (50, 25));
        assert_eq!("50%".parse::<ResizeSpec>().unwrap().target(100, 40).unwrap(), (50, 20));
        assert!("x".parse::<ResizeSpec>().is_err());
        assert!("-5%".parse::<ResizeSpec>().is_err());
        assert!("abc".parse::<ResizeSpec>().is_err());
    }

    #[test]
    fn contrast_modes() {
        assert_eq!(ContrastOptions::default().mode().unwrap(), ContrastMode::Equalize);
        let stretch = ContrastOptions {
            equalize: false,
            saturated: 0.35,
        };
        assert_eq!(stretch.mode().unwrap(), ContrastMode::Stretch { saturated: 0.35 });
        let broken = ContrastOptions {
            equalize: false,
            saturated: 0.0,
        };
        assert!(broken.mode().is_err());
    }

    #[test]
    fn bare_numbers_coerce_into_level_options() {
        let grey: GreyOptions = 16.into();
        assert_eq!(grey.levels, 16);
        assert!(GreyOptions::from(1).validate().is_err());
        let color: ColorOptions = serde_json::from_str(r#"{"nbColor":8}"#).unwrap();
        assert_eq!(color.colors, 8);
    }
}
