//! Interfaces of the external collaborators.
//!
//! [`AccelService`] is the hardware acceleration session: it owns the
//! device, creates and destroys surface batches, and presents surfaces.
//! [`DisplayEvent`] is what the windowing system reports back.

use vo_common::{
    DecodeContextId, EntryPoint, ImageFormat, Profile, Rect, ServiceError, SurfaceHandle, WindowId,
};

use crate::present::TextureTransfer;

/// Static capabilities reported once by the service at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub profiles: Vec<Profile>,
    pub image_formats: Vec<ImageFormat>,
}

/// A hardware video acceleration session.
///
/// Every call may fail. Implementations report the backend status in the
/// returned [`ServiceError`]; callers log it and never retry.
pub trait AccelService {
    /// Supported decode profiles and image formats.
    fn probe_capabilities(&mut self) -> Result<Capabilities, ServiceError>;

    /// Entry points available for `profile`.
    fn query_entry_points(&mut self, profile: Profile) -> Result<Vec<EntryPoint>, ServiceError>;

    /// Bitmask of `rt_format::*` values supported by a profile/entry point.
    fn query_rt_formats(
        &mut self,
        profile: Profile,
        entry_point: EntryPoint,
    ) -> Result<u32, ServiceError>;

    /// Whether the service keeps using a surface after it was presented
    /// (the "direct surface" display attribute).
    fn query_retention_attribute(&mut self) -> Result<bool, ServiceError>;

    /// Create `count` surfaces in one batch.
    fn create_surfaces(
        &mut self,
        count: usize,
        width: u32,
        height: u32,
        rt_format: u32,
    ) -> Result<Vec<SurfaceHandle>, ServiceError>;

    /// Destroy a batch previously returned by [`Self::create_surfaces`].
    fn destroy_surfaces(&mut self, surfaces: &[SurfaceHandle]);

    /// Create the decode context over the full surface batch.
    fn create_decode_context(
        &mut self,
        profile: Profile,
        entry_point: EntryPoint,
        width: u32,
        height: u32,
        surfaces: &[SurfaceHandle],
    ) -> Result<DecodeContextId, ServiceError>;

    fn destroy_decode_context(&mut self, context: DecodeContextId);

    /// Present `surface` into `window`, scaling `src` to `dst`.
    fn present(
        &mut self,
        surface: SurfaceHandle,
        window: WindowId,
        src: Rect,
        dst: Rect,
    ) -> Result<(), ServiceError>;

    /// Hand `surface` to the accelerated rendering path and draw it at `dst`.
    fn present_accelerated(
        &mut self,
        surface: SurfaceHandle,
        transfer: TextureTransfer,
        dst: Rect,
    ) -> Result<(), ServiceError>;
}

impl<S: AccelService + ?Sized> AccelService for &mut S {
    fn probe_capabilities(&mut self) -> Result<Capabilities, ServiceError> {
        (**self).probe_capabilities()
    }

    fn query_entry_points(&mut self, profile: Profile) -> Result<Vec<EntryPoint>, ServiceError> {
        (**self).query_entry_points(profile)
    }

    fn query_rt_formats(
        &mut self,
        profile: Profile,
        entry_point: EntryPoint,
    ) -> Result<u32, ServiceError> {
        (**self).query_rt_formats(profile, entry_point)
    }

    fn query_retention_attribute(&mut self) -> Result<bool, ServiceError> {
        (**self).query_retention_attribute()
    }

    fn create_surfaces(
        &mut self,
        count: usize,
        width: u32,
        height: u32,
        rt_format: u32,
    ) -> Result<Vec<SurfaceHandle>, ServiceError> {
        (**self).create_surfaces(count, width, height, rt_format)
    }

    fn destroy_surfaces(&mut self, surfaces: &[SurfaceHandle]) {
        (**self).destroy_surfaces(surfaces)
    }

    fn create_decode_context(
        &mut self,
        profile: Profile,
        entry_point: EntryPoint,
        width: u32,
        height: u32,
        surfaces: &[SurfaceHandle],
    ) -> Result<DecodeContextId, ServiceError> {
        (**self).create_decode_context(profile, entry_point, width, height, surfaces)
    }

    fn destroy_decode_context(&mut self, context: DecodeContextId) {
        (**self).destroy_decode_context(context)
    }

    fn present(
        &mut self,
        surface: SurfaceHandle,
        window: WindowId,
        src: Rect,
        dst: Rect,
    ) -> Result<(), ServiceError> {
        (**self).present(surface, window, src, dst)
    }

    fn present_accelerated(
        &mut self,
        surface: SurfaceHandle,
        transfer: TextureTransfer,
        dst: Rect,
    ) -> Result<(), ServiceError> {
        (**self).present_accelerated(surface, transfer, dst)
    }
}

/// Notification from the windowing system.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DisplayEvent {
    /// The window was resized to the given client size.
    Resize { width: u32, height: u32 },
    /// Part of the window needs repainting.
    Expose,
    /// Fullscreen was toggled; the window now has the given client size.
    Fullscreen { enabled: bool, width: u32, height: u32 },
}
