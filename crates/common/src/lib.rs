//! Shared types for the VA video output crates.
//!
//! Everything that crosses a crate boundary lives here: opaque surface and
//! context handles, the closed set of accelerated image formats with their
//! codec families and decode profiles, window geometry, and the error
//! taxonomy used by both the pool logic and the acceleration backends.

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{raw, rt_format, CodecFamily, EntryPoint, ImageFormat, Profile, VideoFormat};
pub use error::{ErrorKind, ServiceError, VoError, VoResult};
pub use types::{DecodeContextId, Rect, Resolution, SurfaceHandle, WindowId};
