//! Error types shared by the output session and the acceleration backends.

use thiserror::Error;

use crate::codec::{CodecFamily, EntryPoint, Profile, VideoFormat};
use crate::types::SurfaceHandle;

/// A failed call into the acceleration service.
///
/// Carries the backend status code so it can be logged next to the
/// operation name. Service failures are never retried: the session treats
/// them as permanent for its lifetime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed: {message} (status {status})")]
pub struct ServiceError {
    pub operation: &'static str,
    pub status: i32,
    pub message: String,
}

impl ServiceError {
    /// `VA_STATUS_ERROR_UNIMPLEMENTED`.
    pub const STATUS_UNIMPLEMENTED: i32 = 0x14;

    pub fn new(operation: &'static str, status: i32, message: impl Into<String>) -> Self {
        Self {
            operation,
            status,
            message: message.into(),
        }
    }

    pub fn unimplemented(operation: &'static str) -> Self {
        Self::new(operation, Self::STATUS_UNIMPLEMENTED, "operation not implemented")
    }

    pub fn is_unimplemented(&self) -> bool {
        self.status == Self::STATUS_UNIMPLEMENTED
    }
}

/// Coarse classification of [`VoError`], which decides propagation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad stream parameters or a service failure while configuring. The
    /// output is left unconfigured and may be configured again.
    Configuration,
    /// Free-queue accounting broke: the caller leaked or double-released a
    /// surface. Aborts the session.
    ResourceExhaustion,
    /// A present call failed. Logged and absorbed at the frame boundary.
    Presentation,
    /// Direct mapping was asked for a frame identity beyond the pool.
    OutOfBoundsIdentity,
}

/// Errors reported by the video output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoError {
    #[error("Unsupported image format 0x{0:08x}")]
    UnsupportedFormat(u32),

    #[error("No hardware decode profile available for {0}")]
    UnsupportedProfile(VideoFormat),

    #[error("Entry point {entry_point:?} not usable for {format}")]
    UnsupportedEntryPoint {
        format: VideoFormat,
        entry_point: EntryPoint,
    },

    #[error("YUV 4:2:0 render target not supported by {0:?}")]
    UnsupportedChroma(Profile),

    #[error("Invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Surface pool for {family} would be empty (ceiling {ceiling})")]
    ZeroSizedPool { family: CodecFamily, ceiling: usize },

    #[error("Surface ceiling {ceiling} is below the {minimum} surfaces recycling needs")]
    CeilingTooLow { ceiling: usize, minimum: usize },

    #[error("Capability probe failed: {0}")]
    Probe(ServiceError),

    #[error("Acceleration service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Video output is not configured")]
    NotConfigured,

    #[error("Free surface queue is empty: all {capacity} surfaces are in flight")]
    FreeQueueUnderflow { capacity: usize },

    #[error("Free surface queue overflow while releasing {0}")]
    FreeQueueOverflow(SurfaceHandle),

    #[error("Surface {0} released twice")]
    DoubleRelease(SurfaceHandle),

    #[error("Surface {0} does not belong to this pool")]
    ForeignSurface(SurfaceHandle),

    #[error("Surface {0} released while still held by an output slot")]
    ReleasedWhileDisplayed(SurfaceHandle),

    #[error("Surface {0} published while still in the free-queue")]
    PublishedWhileFree(SurfaceHandle),

    #[error("Frame identity {identity} out of range for {count} surfaces")]
    OutOfBoundsIdentity { identity: usize, count: usize },

    #[error("Session aborted after a fatal pool error; reconfigure to continue")]
    SessionAborted,

    #[error("Presentation failed: {0}")]
    Presentation(ServiceError),
}

impl VoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedFormat(_)
            | Self::UnsupportedProfile(_)
            | Self::UnsupportedEntryPoint { .. }
            | Self::UnsupportedChroma(_)
            | Self::InvalidDimensions { .. }
            | Self::ZeroSizedPool { .. }
            | Self::CeilingTooLow { .. }
            | Self::Probe(_)
            | Self::Service(_)
            | Self::NotConfigured => ErrorKind::Configuration,
            Self::FreeQueueUnderflow { .. }
            | Self::FreeQueueOverflow(_)
            | Self::DoubleRelease(_)
            | Self::ForeignSurface(_)
            | Self::ReleasedWhileDisplayed(_)
            | Self::PublishedWhileFree(_)
            | Self::SessionAborted => ErrorKind::ResourceExhaustion,
            Self::OutOfBoundsIdentity { .. } => ErrorKind::OutOfBoundsIdentity,
            Self::Presentation(_) => ErrorKind::Presentation,
        }
    }

    /// Whether the error breaks the caller contract and must end the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ResourceExhaustion | ErrorKind::OutOfBoundsIdentity
        )
    }
}

/// Convenience Result type for video output operations.
pub type VoResult<T> = Result<T, VoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_display_carries_status() {
        let err = ServiceError::new("vaPutSurface()", 3, "invalid context");
        assert_eq!(err.to_string(), "vaPutSurface() failed: invalid context (status 3)");
        assert!(!err.is_unimplemented());
        assert!(ServiceError::unimplemented("vaCopySurfaceGLX()").is_unimplemented());
    }

    #[test]
    fn service_error_converts_to_configuration_error() {
        let err: VoError = ServiceError::new("vaCreateSurfaces()", 1, "allocation failed").into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!err.is_fatal());
    }

    #[test]
    fn pool_accounting_errors_are_fatal() {
        let handle = SurfaceHandle::new(4);
        for err in [
            VoError::FreeQueueUnderflow { capacity: 6 },
            VoError::FreeQueueOverflow(handle),
            VoError::DoubleRelease(handle),
            VoError::ForeignSurface(handle),
            VoError::ReleasedWhileDisplayed(handle),
            VoError::PublishedWhileFree(handle),
            VoError::OutOfBoundsIdentity { identity: 17, count: 17 },
        ] {
            assert!(err.is_fatal(), "{err} should be fatal");
        }
    }

    #[test]
    fn presentation_errors_are_absorbable() {
        let err = VoError::Presentation(ServiceError::new("vaPutSurface()", 2, "bad"));
        assert_eq!(err.kind(), ErrorKind::Presentation);
        assert!(!err.is_fatal());
    }

    #[test]
    fn underflow_message_names_capacity() {
        let err = VoError::FreeQueueUnderflow { capacity: 6 };
        assert_eq!(
            err.to_string(),
            "Free surface queue is empty: all 6 surfaces are in flight"
        );
    }
}
