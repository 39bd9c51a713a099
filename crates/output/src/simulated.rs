//! In-process acceleration service.
//!
//! Hands out sequential surface ids, records every call that changes state,
//! and can be told to fail any operation. Used by the tests and by the demo
//! binary on machines without a VA driver.

use std::collections::HashSet;

use tracing::debug;
use vo_common::{
    rt_format, DecodeContextId, EntryPoint, ImageFormat, Profile, Rect, ServiceError,
    SurfaceHandle, WindowId,
};

use crate::present::TextureTransfer;
use crate::service::{AccelService, Capabilities};

/// Generic failure status (`VA_STATUS_ERROR_OPERATION_FAILED`).
const STATUS_FAILED: i32 = 0x01;
/// `VA_STATUS_ERROR_ALLOCATION_FAILED`.
const STATUS_ALLOCATION_FAILED: i32 = 0x03;

/// State-changing calls, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceEvent {
    SurfacesCreated(Vec<SurfaceHandle>),
    SurfacesDestroyed(Vec<SurfaceHandle>),
    ContextCreated(DecodeContextId),
    ContextDestroyed(DecodeContextId),
}

/// A successful present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PresentRecord {
    Window {
        surface: SurfaceHandle,
        window: WindowId,
        src: Rect,
        dst: Rect,
    },
    Accelerated {
        surface: SurfaceHandle,
        transfer: TextureTransfer,
        dst: Rect,
    },
}

impl PresentRecord {
    pub fn surface(&self) -> SurfaceHandle {
        match self {
            Self::Window { surface, .. } | Self::Accelerated { surface, .. } => *surface,
        }
    }
}

#[derive(Debug)]
pub struct SimulatedService {
    profiles: Vec<Profile>,
    image_formats: Vec<ImageFormat>,
    rt_formats: u32,
    /// `None` makes the attribute query fail.
    retention: Option<bool>,
    retention_queries: usize,

    fail_probe: bool,
    fail_entry_points: HashSet<Profile>,
    fail_surfaces: bool,
    fail_context: bool,
    fail_present: bool,
    texture_copy: bool,

    next_surface: u32,
    next_context: u32,
    live_surfaces: Vec<SurfaceHandle>,
    live_context: Option<DecodeContextId>,
    events: Vec<ServiceEvent>,
    presents: Vec<PresentRecord>,
}

impl Default for SimulatedService {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedService {
    /// Every profile with VLD decode, 4:2:0 render targets, and no surface
    /// retention.
    pub fn new() -> Self {
        Self {
            profiles: vec![
                Profile::Mpeg2Simple,
                Profile::Mpeg2Main,
                Profile::Mpeg4Simple,
                Profile::Mpeg4AdvancedSimple,
                Profile::Mpeg4Main,
                Profile::H264Baseline,
                Profile::H264Main,
                Profile::H264High,
                Profile::Vc1Simple,
                Profile::Vc1Main,
                Profile::Vc1Advanced,
            ],
            image_formats: vec![
                ImageFormat::from_fourcc(b'N', b'V', b'1', b'2'),
                ImageFormat::from_fourcc(b'Y', b'V', b'1', b'2'),
                ImageFormat::from_fourcc(b'B', b'G', b'R', b'A'),
            ],
            rt_formats: rt_format::YUV420,
            retention: Some(false),
            retention_queries: 0,
            fail_probe: false,
            fail_entry_points: HashSet::new(),
            fail_surfaces: false,
            fail_context: false,
            fail_present: false,
            texture_copy: true,
            next_surface: 1,
            next_context: 1,
            live_surfaces: Vec::new(),
            live_context: None,
            events: Vec::new(),
            presents: Vec::new(),
        }
    }

    pub fn with_profiles(mut self, profiles: Vec<Profile>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_rt_formats(mut self, mask: u32) -> Self {
        self.rt_formats = mask;
        self
    }

    pub fn with_retention(mut self, retention: Option<bool>) -> Self {
        self.retention = retention;
        self
    }

    pub fn failing_probe(mut self) -> Self {
        self.fail_probe = true;
        self
    }

    pub fn failing_entry_points(mut self, profile: Profile) -> Self {
        self.fail_entry_points.insert(profile);
        self
    }

    pub fn failing_surfaces(mut self) -> Self {
        self.fail_surfaces = true;
        self
    }

    pub fn failing_context(mut self) -> Self {
        self.fail_context = true;
        self
    }

    pub fn failing_present(mut self) -> Self {
        self.fail_present = true;
        self
    }

    /// Report texture copy as unimplemented; binding still works.
    pub fn without_texture_copy(mut self) -> Self {
        self.texture_copy = false;
        self
    }

    pub fn set_retention(&mut self, retention: Option<bool>) {
        self.retention = retention;
    }

    pub fn set_failing_surfaces(&mut self, fail: bool) {
        self.fail_surfaces = fail;
    }

    pub fn set_failing_context(&mut self, fail: bool) {
        self.fail_context = fail;
    }

    pub fn set_failing_present(&mut self, fail: bool) {
        self.fail_present = fail;
    }

    pub fn retention_queries(&self) -> usize {
        self.retention_queries
    }

    /// Surfaces created and not yet destroyed.
    pub fn live_surfaces(&self) -> &[SurfaceHandle] {
        &self.live_surfaces
    }

    pub fn live_context(&self) -> Option<DecodeContextId> {
        self.live_context
    }

    pub fn events(&self) -> &[ServiceEvent] {
        &self.events
    }

    pub fn presents(&self) -> &[PresentRecord] {
        &self.presents
    }

    pub fn last_presented(&self) -> Option<SurfaceHandle> {
        self.presents.last().map(PresentRecord::surface)
    }
}

impl AccelService for SimulatedService {
    fn probe_capabilities(&mut self) -> Result<Capabilities, ServiceError> {
        if self.fail_probe {
            return Err(ServiceError::new(
                "vaQueryConfigProfiles()",
                STATUS_FAILED,
                "simulated probe failure",
            ));
        }
        Ok(Capabilities {
            profiles: self.profiles.clone(),
            image_formats: self.image_formats.clone(),
        })
    }

    fn query_entry_points(&mut self, profile: Profile) -> Result<Vec<EntryPoint>, ServiceError> {
        if self.fail_entry_points.contains(&profile) {
            return Err(ServiceError::new(
                "vaQueryConfigEntrypoints()",
                STATUS_FAILED,
                "simulated entry point failure",
            ));
        }
        Ok(match profile {
            Profile::Mpeg2Simple | Profile::Mpeg2Main => {
                vec![EntryPoint::Vld, EntryPoint::Idct, EntryPoint::MoComp]
            }
            _ => vec![EntryPoint::Vld],
        })
    }

    fn query_rt_formats(
        &mut self,
        _profile: Profile,
        _entry_point: EntryPoint,
    ) -> Result<u32, ServiceError> {
        Ok(self.rt_formats)
    }

    fn query_retention_attribute(&mut self) -> Result<bool, ServiceError> {
        self.retention_queries += 1;
        self.retention.ok_or_else(|| {
            ServiceError::new(
                "vaGetDisplayAttributes()",
                STATUS_FAILED,
                "simulated attribute failure",
            )
        })
    }

    fn create_surfaces(
        &mut self,
        count: usize,
        width: u32,
        height: u32,
        _rt_format: u32,
    ) -> Result<Vec<SurfaceHandle>, ServiceError> {
        if self.fail_surfaces {
            return Err(ServiceError::new(
                "vaCreateSurfaces()",
                STATUS_ALLOCATION_FAILED,
                "simulated allocation failure",
            ));
        }

        let batch: Vec<SurfaceHandle> = (0..count as u32)
            .map(|offset| SurfaceHandle::new(self.next_surface + offset))
            .collect();
        self.next_surface += count as u32;

        debug!(count, width, height, "Simulated surfaces created");
        self.live_surfaces.extend_from_slice(&batch);
        self.events.push(ServiceEvent::SurfacesCreated(batch.clone()));
        Ok(batch)
    }

    fn destroy_surfaces(&mut self, surfaces: &[SurfaceHandle]) {
        self.live_surfaces.retain(|handle| !surfaces.contains(handle));
        self.events
            .push(ServiceEvent::SurfacesDestroyed(surfaces.to_vec()));
    }

    fn create_decode_context(
        &mut self,
        _profile: Profile,
        _entry_point: EntryPoint,
        _width: u32,
        _height: u32,
        _surfaces: &[SurfaceHandle],
    ) -> Result<DecodeContextId, ServiceError> {
        if self.fail_context {
            return Err(ServiceError::new(
                "vaCreateContext()",
                STATUS_FAILED,
                "simulated context failure",
            ));
        }

        let context = DecodeContextId(self.next_context);
        self.next_context += 1;
        self.live_context = Some(context);
        self.events.push(ServiceEvent::ContextCreated(context));
        Ok(context)
    }

    fn destroy_decode_context(&mut self, context: DecodeContextId) {
        if self.live_context == Some(context) {
            self.live_context = None;
        }
        self.events.push(ServiceEvent::ContextDestroyed(context));
    }

    fn present(
        &mut self,
        surface: SurfaceHandle,
        window: WindowId,
        src: Rect,
        dst: Rect,
    ) -> Result<(), ServiceError> {
        if self.fail_present {
            return Err(ServiceError::new(
                "vaPutSurface()",
                STATUS_FAILED,
                "simulated present failure",
            ));
        }
        self.presents.push(PresentRecord::Window {
            surface,
            window,
            src,
            dst,
        });
        Ok(())
    }

    fn present_accelerated(
        &mut self,
        surface: SurfaceHandle,
        transfer: TextureTransfer,
        dst: Rect,
    ) -> Result<(), ServiceError> {
        if transfer == TextureTransfer::Copy && !self.texture_copy {
            return Err(ServiceError::unimplemented("vaCopySurfaceGLX()"));
        }
        if self.fail_present {
            return Err(ServiceError::new(
                "vaCopySurfaceGLX()",
                STATUS_FAILED,
                "simulated present failure",
            ));
        }
        self.presents.push(PresentRecord::Accelerated {
            surface,
            transfer,
            dst,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_never_share_ids() {
        let mut service = SimulatedService::new();
        let first = service.create_surfaces(3, 64, 64, rt_format::YUV420).unwrap();
        let second = service.create_surfaces(2, 64, 64, rt_format::YUV420).unwrap();

        assert!(first.iter().all(|handle| !second.contains(handle)));
        assert_eq!(service.live_surfaces().len(), 5);

        service.destroy_surfaces(&first);
        assert_eq!(service.live_surfaces(), second.as_slice());
    }

    #[test]
    fn retention_failure_counts_as_a_query() {
        let mut service = SimulatedService::new().with_retention(None);
        assert!(service.query_retention_attribute().is_err());
        assert_eq!(service.retention_queries(), 1);
    }
}
