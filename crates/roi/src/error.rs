use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoiError {
    #[error("Invalid value for option `{option}`: {value}")]
    InvalidOption { option: &'static str, value: String },

    #[error(
        "Rectangle at ({x}, {y}) sized {width}x{height} lies outside the {image_width}x{image_height} image"
    )]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("Mask is {mask_width}x{mask_height} but the image is {image_width}x{image_height}")]
    DimensionMismatch {
        mask_width: u32,
        mask_height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("Pixel engine failure: {0}")]
    EngineFailure(String),

    #[error("Image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of [`RoiError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidOption,
    OutOfBounds,
    EngineFailure,
}

impl RoiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidOption { .. } => ErrorKind::InvalidOption,
            Self::OutOfBounds { .. } | Self::DimensionMismatch { .. } => ErrorKind::OutOfBounds,
            Self::EngineFailure(_)
            | Self::Codec(_)
            | Self::Io(_)
            | Self::Base64(_)
            | Self::Serialization(_) => ErrorKind::EngineFailure,
        }
    }

    pub(crate) fn invalid(option: &'static str, value: impl ToString) -> Self {
        Self::InvalidOption {
            option,
            value: value.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RoiError>;

/// Parse an enumerated option, reporting the offending value on failure.
pub(crate) fn parse_option<T: std::str::FromStr>(option: &'static str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| RoiError::invalid(option, value))
}
