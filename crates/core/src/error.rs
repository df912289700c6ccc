/// Result alias that carries the custom [`VisualizerError`] type.
pub type Result<T> = std::result::Result<T, VisualizerError>;

/// Common error type for the core crate.
///
/// Only asset uploads and configuration loading are fallible. The per-frame
/// render path never produces one of these.
#[derive(Debug, thiserror::Error)]
pub enum VisualizerError {
    /// The uploaded audio asset is malformed or uses an unsupported codec.
    #[error("unable to decode audio: {0}")]
    Decode(String),
    /// The host has no audio subsystem to play through.
    #[error("audio is unavailable in this environment: {0}")]
    UnsupportedEnvironment(String),
    /// The uploaded image could not be decoded.
    #[error("unable to load image: {0}")]
    ImageLoad(#[from] image::ImageError),
    /// A configuration preset could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Message(String),
}

impl VisualizerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Returns `true` for errors raised while accepting an uploaded asset.
    pub fn is_upload_error(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::UnsupportedEnvironment(_) | Self::ImageLoad(_)
        )
    }
}

impl From<hound::Error> for VisualizerError {
    fn from(value: hound::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

impl From<symphonia::core::errors::Error> for VisualizerError {
    fn from(value: symphonia::core::errors::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

impl From<&str> for VisualizerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VisualizerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
