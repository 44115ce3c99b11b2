use thiserror::Error;

pub type PreviewResult<T> = std::result::Result<T, PreviewError>;

/// Why a preview never appeared or went away.
///
/// None of these reach the user; the popup simply does not show. They exist
/// so the pipeline can log and branch on the cause.
#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("target is not a supported image url")]
    UnsupportedTarget,
    #[error("transfer failed: {0}")]
    TransferFailure(#[from] TransportError),
    #[error("decode failed: {0}")]
    DecodeFailure(#[from] DecodeError),
    #[error("preview cancelled")]
    Cancelled,
}

impl PreviewError {
    /// Cancellation is the normal way a preview ends and is not a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            PreviewError::Cancelled | PreviewError::TransferFailure(TransportError::Aborted)
        )
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("transfer aborted by the write sink")]
    Aborted,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unrecognized image format")]
    UnsupportedFormat,
    #[error("image data ended before the picture was complete")]
    Truncated,
    #[error(transparent)]
    Png(#[from] png::DecodingError),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}
