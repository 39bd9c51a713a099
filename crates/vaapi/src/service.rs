//! [`AccelService`] over a libva X11 display.

use std::collections::HashMap;
use std::ffi::{c_int, CString};
use std::ptr;

use tracing::{debug, error, info, warn};
use vo_common::{
    DecodeContextId, EntryPoint, ImageFormat, Profile, Rect, ServiceError, SurfaceHandle, WindowId,
};
use vo_output::{AccelService, Capabilities, TextureTransfer};

use crate::ffi::{
    check_va_status, Drawable, VAConfigAttrib, VAConfigID, VADisplay, VADisplayAttribute,
    VAImageFormat, VAStatus, VASurfaceID, VaLibrary, VaLoadError, XDisplay,
    VA_CONFIG_ATTRIB_RT_FORMAT, VA_DISPLAY_ATTRIB_DIRECT_SURFACE, VA_DISPLAY_ATTRIB_GETTABLE,
    VA_FRAME_PICTURE, VA_PROGRESSIVE, VA_STATUS_ERROR_OPERATION_FAILED,
};

/// An initialised VA display on an X11 connection.
#[derive(Debug)]
pub struct VaapiService {
    lib: VaLibrary,
    x_display: XDisplay,
    display: VADisplay,
    version: (i32, i32),
    /// Decode configs to destroy together with their context.
    configs: HashMap<DecodeContextId, VAConfigID>,
}

// SAFETY: the display handles are only used through `&mut self`, so calls
// on one display never overlap. Neither Xlib nor libva ties a display to
// the thread that opened it.
unsafe impl Send for VaapiService {}

impl VaapiService {
    /// Open `x_display` (or `$DISPLAY` when `None`) and initialise libva on it.
    pub fn open(lib: VaLibrary, x_display: Option<&str>) -> Result<Self, VaLoadError> {
        let name = x_display
            .map(|name| {
                CString::new(name).map_err(|_| VaLoadError::DisplayUnavailable(name.to_string()))
            })
            .transpose()?;
        let label = x_display.unwrap_or("$DISPLAY").to_string();

        // SAFETY: XOpenDisplay accepts NULL (use $DISPLAY) or a valid C
        // string that outlives the call.
        let x = unsafe { (lib.XOpenDisplay)(name.as_ref().map_or(ptr::null(), |n| n.as_ptr())) };
        if x.is_null() {
            return Err(VaLoadError::DisplayUnavailable(label));
        }

        // SAFETY: x is a live Xlib display.
        let display = unsafe { (lib.vaGetDisplay)(x) };
        if display.is_null() {
            // SAFETY: x was opened above and is not used afterwards.
            unsafe { (lib.XCloseDisplay)(x) };
            return Err(VaLoadError::DisplayUnavailable(label));
        }

        let (mut major, mut minor): (c_int, c_int) = (0, 0);
        // SAFETY: display comes from vaGetDisplay; the out-params are locals.
        let status = unsafe { (lib.vaInitialize)(display, &mut major, &mut minor) };
        if let Err(status) = check_va_status(status) {
            let message = lib.error_str(status);
            // SAFETY: x is still open and nothing else references it.
            unsafe { (lib.XCloseDisplay)(x) };
            return Err(VaLoadError::Initialize { status, message });
        }

        info!(display = %label, major, minor, "VA API initialised");

        Ok(Self {
            lib,
            x_display: x,
            display,
            version: (major, minor),
            configs: HashMap::new(),
        })
    }

    /// libva API version reported by `vaInitialize`.
    pub fn version(&self) -> (i32, i32) {
        self.version
    }

    fn fail(&self, operation: &'static str, status: VAStatus) -> ServiceError {
        let err = ServiceError::new(operation, status, self.lib.error_str(status));
        warn!(operation, status, error = %err, "VA call failed");
        err
    }

    fn check(&self, operation: &'static str, status: VAStatus) -> Result<(), ServiceError> {
        check_va_status(status).map_err(|status| self.fail(operation, status))
    }

    fn query_profiles(&mut self) -> Result<Vec<Profile>, ServiceError> {
        // SAFETY: display is initialised for the lifetime of self.
        let max = unsafe { (self.lib.vaMaxNumProfiles)(self.display) }.max(0);
        let mut raw = vec![0; max as usize];
        let mut count: c_int = 0;
        // SAFETY: raw has room for vaMaxNumProfiles entries.
        let status =
            unsafe { (self.lib.vaQueryConfigProfiles)(self.display, raw.as_mut_ptr(), &mut count) };
        self.check("vaQueryConfigProfiles()", status)?;

        raw.truncate(count.clamp(0, max) as usize);
        Ok(raw.into_iter().filter_map(Profile::from_raw).collect())
    }

    fn query_image_formats(&mut self) -> Result<Vec<ImageFormat>, ServiceError> {
        // SAFETY: display is initialised for the lifetime of self.
        let max = unsafe { (self.lib.vaMaxNumImageFormats)(self.display) }.max(0);
        let mut raw = vec![VAImageFormat::default(); max as usize];
        let mut count: c_int = 0;
        // SAFETY: raw has room for vaMaxNumImageFormats entries.
        let status =
            unsafe { (self.lib.vaQueryImageFormats)(self.display, raw.as_mut_ptr(), &mut count) };
        self.check("vaQueryImageFormats()", status)?;

        raw.truncate(count.clamp(0, max) as usize);
        Ok(raw
            .into_iter()
            .map(|format| ImageFormat {
                fourcc: format.fourcc,
            })
            .collect())
    }
}

impl AccelService for VaapiService {
    fn probe_capabilities(&mut self) -> Result<Capabilities, ServiceError> {
        Ok(Capabilities {
            image_formats: self.query_image_formats()?,
            profiles: self.query_profiles()?,
        })
    }

    fn query_entry_points(&mut self, profile: Profile) -> Result<Vec<EntryPoint>, ServiceError> {
        // SAFETY: display is initialised for the lifetime of self.
        let max = unsafe { (self.lib.vaMaxNumEntrypoints)(self.display) }.max(0);
        let mut raw = vec![0; max as usize];
        let mut count: c_int = 0;
        // SAFETY: raw has room for vaMaxNumEntrypoints entries.
        let status = unsafe {
            (self.lib.vaQueryConfigEntrypoints)(
                self.display,
                profile.raw(),
                raw.as_mut_ptr(),
                &mut count,
            )
        };
        self.check("vaQueryConfigEntrypoints()", status)?;

        raw.truncate(count.clamp(0, max) as usize);
        Ok(raw.into_iter().filter_map(EntryPoint::from_raw).collect())
    }

    fn query_rt_formats(
        &mut self,
        profile: Profile,
        entry_point: EntryPoint,
    ) -> Result<u32, ServiceError> {
        let mut attrib = VAConfigAttrib {
            type_: VA_CONFIG_ATTRIB_RT_FORMAT,
            value: 0,
        };
        // SAFETY: one attribute, passed by pointer to a local.
        let status = unsafe {
            (self.lib.vaGetConfigAttributes)(
                self.display,
                profile.raw(),
                entry_point.raw(),
                &mut attrib,
                1,
            )
        };
        self.check("vaGetConfigAttributes()", status)?;
        Ok(attrib.value)
    }

    fn query_retention_attribute(&mut self) -> Result<bool, ServiceError> {
        let mut attr = VADisplayAttribute {
            type_: VA_DISPLAY_ATTRIB_DIRECT_SURFACE,
            flags: VA_DISPLAY_ATTRIB_GETTABLE,
            ..VADisplayAttribute::default()
        };
        // SAFETY: one attribute, passed by pointer to a local.
        let status = unsafe { (self.lib.vaGetDisplayAttributes)(self.display, &mut attr, 1) };
        self.check("vaGetDisplayAttributes()", status)?;
        Ok(attr.value != 0)
    }

    fn create_surfaces(
        &mut self,
        count: usize,
        width: u32,
        height: u32,
        rt_format: u32,
    ) -> Result<Vec<SurfaceHandle>, ServiceError> {
        let mut ids: Vec<VASurfaceID> = vec![0; count];
        // SAFETY: ids has room for `count` surface ids; no attributes.
        let status = unsafe {
            (self.lib.vaCreateSurfaces)(
                self.display,
                rt_format,
                width,
                height,
                ids.as_mut_ptr(),
                count as u32,
                ptr::null_mut(),
                0,
            )
        };
        self.check("vaCreateSurfaces()", status)?;

        debug!(surfaces = count, width, height, "VA surfaces created");
        Ok(ids.into_iter().map(SurfaceHandle::new).collect())
    }

    fn destroy_surfaces(&mut self, surfaces: &[SurfaceHandle]) {
        if surfaces.is_empty() {
            return;
        }
        let mut ids: Vec<VASurfaceID> = surfaces.iter().map(|s| s.raw()).collect();
        // SAFETY: ids came from vaCreateSurfaces on this display.
        let status = unsafe {
            (self.lib.vaDestroySurfaces)(self.display, ids.as_mut_ptr(), ids.len() as c_int)
        };
        if let Err(status) = check_va_status(status) {
            error!(status, surfaces = ids.len(), "Failed to destroy VA surfaces");
        }
    }

    fn create_decode_context(
        &mut self,
        profile: Profile,
        entry_point: EntryPoint,
        width: u32,
        height: u32,
        surfaces: &[SurfaceHandle],
    ) -> Result<DecodeContextId, ServiceError> {
        let mut attrib = VAConfigAttrib {
            type_: VA_CONFIG_ATTRIB_RT_FORMAT,
            value: vo_common::rt_format::YUV420,
        };
        let mut config: VAConfigID = 0;
        // SAFETY: one attribute and the out-param are locals.
        let status = unsafe {
            (self.lib.vaCreateConfig)(
                self.display,
                profile.raw(),
                entry_point.raw(),
                &mut attrib,
                1,
                &mut config,
            )
        };
        self.check("vaCreateConfig()", status)?;

        let mut ids: Vec<VASurfaceID> = surfaces.iter().map(|s| s.raw()).collect();
        let mut context = 0;
        // SAFETY: config was just created; ids came from vaCreateSurfaces.
        let status = unsafe {
            (self.lib.vaCreateContext)(
                self.display,
                config,
                width as c_int,
                height as c_int,
                VA_PROGRESSIVE,
                ids.as_mut_ptr(),
                ids.len() as c_int,
                &mut context,
            )
        };
        if let Err(status) = check_va_status(status) {
            // SAFETY: config is unused by any context.
            unsafe { (self.lib.vaDestroyConfig)(self.display, config) };
            return Err(self.fail("vaCreateContext()", status));
        }

        let id = DecodeContextId(context);
        self.configs.insert(id, config);
        Ok(id)
    }

    fn destroy_decode_context(&mut self, context: DecodeContextId) {
        // SAFETY: context came from vaCreateContext on this display.
        let status = unsafe { (self.lib.vaDestroyContext)(self.display, context.0) };
        if let Err(status) = check_va_status(status) {
            error!(status, context = context.0, "Failed to destroy VA context");
        }

        if let Some(config) = self.configs.remove(&context) {
            // SAFETY: the only context using config is gone.
            let status = unsafe { (self.lib.vaDestroyConfig)(self.display, config) };
            if let Err(status) = check_va_status(status) {
                error!(status, config, "Failed to destroy VA config");
            }
        }
    }

    fn present(
        &mut self,
        surface: SurfaceHandle,
        window: WindowId,
        src: Rect,
        dst: Rect,
    ) -> Result<(), ServiceError> {
        // SAFETY: surface belongs to this display; no clip rectangles.
        let status = unsafe {
            (self.lib.vaPutSurface)(
                self.display,
                surface.raw(),
                window.0 as Drawable,
                src.x as i16,
                src.y as i16,
                src.width as u16,
                src.height as u16,
                dst.x as i16,
                dst.y as i16,
                dst.width as u16,
                dst.height as u16,
                ptr::null_mut(),
                0,
                VA_FRAME_PICTURE,
            )
        };
        self.check("vaPutSurface()", status)
    }

    fn present_accelerated(
        &mut self,
        _surface: SurfaceHandle,
        transfer: TextureTransfer,
        _dst: Rect,
    ) -> Result<(), ServiceError> {
        // The GLX interop entry points need a GL context this backend does
        // not own.
        match transfer {
            TextureTransfer::Copy => Err(ServiceError::unimplemented("vaCopySurfaceGLX()")),
            TextureTransfer::Bind => Err(ServiceError::new(
                "vaAssociateSurfaceGLX()",
                VA_STATUS_ERROR_OPERATION_FAILED,
                "no GL context attached to this display",
            )),
        }
    }
}

impl Drop for VaapiService {
    fn drop(&mut self) {
        for (context, config) in self.configs.drain() {
            warn!(context = context.0, "Decode context still alive at shutdown");
            // SAFETY: both ids belong to this display and are destroyed once.
            unsafe {
                (self.lib.vaDestroyContext)(self.display, context.0);
                (self.lib.vaDestroyConfig)(self.display, config);
            }
        }

        // SAFETY: display was initialised in `open` and is not used again.
        let status = unsafe { (self.lib.vaTerminate)(self.display) };
        if let Err(status) = check_va_status(status) {
            error!(status, "vaTerminate() failed");
        }
        // SAFETY: the VA display referencing x_display is terminated.
        unsafe { (self.lib.XCloseDisplay)(self.x_display) };
        debug!("VA display closed");
    }
}
