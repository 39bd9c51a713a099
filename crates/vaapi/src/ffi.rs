//! Raw FFI bindings for libva and its X11 backend.
//!
//! Loaded at runtime via `libloading`, so the crate builds and its tests run
//! on machines without a VA driver. Only the calls the video output needs
//! are bound: display setup, capability queries, surface and context
//! lifetime, and `vaPutSurface`.
//!
//! Reference: `va/va.h` and `va/va_x11.h` (libva 2.x).

use std::ffi::{c_char, c_int, c_uint, c_ulong, c_void, CStr};
use std::path::Path;

use libloading::Library;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Basic types
// ---------------------------------------------------------------------------

/// Opaque `VADisplay`.
pub type VADisplay = *mut c_void;

/// Opaque Xlib `Display *`.
pub type XDisplay = *mut c_void;

pub type VAStatus = c_int;
pub type VAProfile = c_int;
pub type VAEntrypoint = c_int;
pub type VAGenericID = c_uint;
pub type VASurfaceID = VAGenericID;
pub type VAConfigID = VAGenericID;
pub type VAContextID = VAGenericID;

/// X11 `Drawable`.
pub type Drawable = c_ulong;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const VA_STATUS_SUCCESS: VAStatus = 0x0000_0000;
pub const VA_STATUS_ERROR_OPERATION_FAILED: VAStatus = 0x0000_0001;
pub const VA_STATUS_ERROR_UNIMPLEMENTED: VAStatus = 0x0000_0014;

pub const VA_INVALID_ID: VAGenericID = 0xFFFF_FFFF;

/// `VAConfigAttribRTFormat`.
pub const VA_CONFIG_ATTRIB_RT_FORMAT: c_int = 0;

/// `VADisplayAttribDirectSurface`.
pub const VA_DISPLAY_ATTRIB_DIRECT_SURFACE: c_int = 5;
pub const VA_DISPLAY_ATTRIB_GETTABLE: c_uint = 0x0001;

/// Context creation flag for progressive content.
pub const VA_PROGRESSIVE: c_int = 0x1;

/// `vaPutSurface` flag: present the whole frame, not a field.
pub const VA_FRAME_PICTURE: c_uint = 0x0000_0000;

// ---------------------------------------------------------------------------
// Structs
// ---------------------------------------------------------------------------

/// `VAConfigAttrib`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default)]
pub struct VAConfigAttrib {
    pub type_: c_int,
    pub value: c_uint,
}

/// `VAImageFormat`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default)]
pub struct VAImageFormat {
    pub fourcc: u32,
    pub byte_order: u32,
    pub bits_per_pixel: u32,
    pub depth: u32,
    pub red_mask: u32,
    pub green_mask: u32,
    pub blue_mask: u32,
    pub alpha_mask: u32,
    pub va_reserved: [u32; 4],
}

/// `VADisplayAttribute`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default)]
pub struct VADisplayAttribute {
    pub type_: c_int,
    pub min_value: i32,
    pub max_value: i32,
    pub value: i32,
    pub flags: u32,
    pub va_reserved: [u32; 4],
}

// ---------------------------------------------------------------------------
// Function table
// ---------------------------------------------------------------------------

type XOpenDisplayFn = unsafe extern "C" fn(*const c_char) -> XDisplay;
type XCloseDisplayFn = unsafe extern "C" fn(XDisplay) -> c_int;
type GetDisplayFn = unsafe extern "C" fn(XDisplay) -> VADisplay;
type InitializeFn = unsafe extern "C" fn(VADisplay, *mut c_int, *mut c_int) -> VAStatus;
type TerminateFn = unsafe extern "C" fn(VADisplay) -> VAStatus;
type ErrorStrFn = unsafe extern "C" fn(VAStatus) -> *const c_char;
type MaxNumFn = unsafe extern "C" fn(VADisplay) -> c_int;
type QueryProfilesFn = unsafe extern "C" fn(VADisplay, *mut VAProfile, *mut c_int) -> VAStatus;
type QueryEntrypointsFn =
    unsafe extern "C" fn(VADisplay, VAProfile, *mut VAEntrypoint, *mut c_int) -> VAStatus;
type QueryImageFormatsFn =
    unsafe extern "C" fn(VADisplay, *mut VAImageFormat, *mut c_int) -> VAStatus;
type GetConfigAttributesFn = unsafe extern "C" fn(
    VADisplay,
    VAProfile,
    VAEntrypoint,
    *mut VAConfigAttrib,
    c_int,
) -> VAStatus;
type CreateConfigFn = unsafe extern "C" fn(
    VADisplay,
    VAProfile,
    VAEntrypoint,
    *mut VAConfigAttrib,
    c_int,
    *mut VAConfigID,
) -> VAStatus;
type DestroyConfigFn = unsafe extern "C" fn(VADisplay, VAConfigID) -> VAStatus;
type CreateContextFn = unsafe extern "C" fn(
    VADisplay,
    VAConfigID,
    c_int,
    c_int,
    c_int,
    *mut VASurfaceID,
    c_int,
    *mut VAContextID,
) -> VAStatus;
type DestroyContextFn = unsafe extern "C" fn(VADisplay, VAContextID) -> VAStatus;
type CreateSurfacesFn = unsafe extern "C" fn(
    VADisplay,
    c_uint,
    c_uint,
    c_uint,
    *mut VASurfaceID,
    c_uint,
    *mut c_void,
    c_uint,
) -> VAStatus;
type DestroySurfacesFn = unsafe extern "C" fn(VADisplay, *mut VASurfaceID, c_int) -> VAStatus;
type GetDisplayAttributesFn =
    unsafe extern "C" fn(VADisplay, *mut VADisplayAttribute, c_int) -> VAStatus;
type PutSurfaceFn = unsafe extern "C" fn(
    VADisplay,
    VASurfaceID,
    Drawable,
    i16,
    i16,
    u16,
    u16,
    i16,
    i16,
    u16,
    u16,
    *mut c_void,
    c_uint,
    c_uint,
) -> VAStatus;

/// Function pointers resolved from libX11, libva and libva-x11.
#[allow(non_snake_case)]
pub struct VaLibrary {
    // The loaded library handles must outlive every pointer below.
    _xlib: Library,
    _libva: Library,
    _libva_x11: Library,

    // -- Xlib --
    pub XOpenDisplay: XOpenDisplayFn,
    pub XCloseDisplay: XCloseDisplayFn,

    // -- Display --
    pub vaGetDisplay: GetDisplayFn,
    pub vaInitialize: InitializeFn,
    pub vaTerminate: TerminateFn,
    pub vaErrorStr: ErrorStrFn,

    // -- Capabilities --
    pub vaMaxNumProfiles: MaxNumFn,
    pub vaQueryConfigProfiles: QueryProfilesFn,
    pub vaMaxNumEntrypoints: MaxNumFn,
    pub vaQueryConfigEntrypoints: QueryEntrypointsFn,
    pub vaMaxNumImageFormats: MaxNumFn,
    pub vaQueryImageFormats: QueryImageFormatsFn,
    pub vaGetConfigAttributes: GetConfigAttributesFn,
    pub vaGetDisplayAttributes: GetDisplayAttributesFn,

    // -- Configs, contexts and surfaces --
    pub vaCreateConfig: CreateConfigFn,
    pub vaDestroyConfig: DestroyConfigFn,
    pub vaCreateContext: CreateContextFn,
    pub vaDestroyContext: DestroyContextFn,
    pub vaCreateSurfaces: CreateSurfacesFn,
    pub vaDestroySurfaces: DestroySurfacesFn,

    // -- Presentation --
    pub vaPutSurface: PutSurfaceFn,
}

impl std::fmt::Debug for VaLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaLibrary").finish_non_exhaustive()
    }
}

// SAFETY: VaLibrary only holds function pointers into shared libraries that
// stay loaded for its lifetime. libva entry points may be called from any
// thread; the service wrapper serialises calls on one display.
unsafe impl Send for VaLibrary {}
unsafe impl Sync for VaLibrary {}

/// Copy one symbol out of `lib`.
///
/// # Safety
///
/// `T` must be the exact function pointer type of the named C symbol, and
/// `name` must be NUL-terminated.
unsafe fn symbol<T: Copy>(lib: &Library, name: &'static [u8]) -> Result<T, VaLoadError> {
    lib.get::<T>(name).map(|sym| *sym).map_err(|e| {
        let printable = String::from_utf8_lossy(name.strip_suffix(b"\0").unwrap_or(name));
        VaLoadError::SymbolNotFound(format!("{printable}: {e}"))
    })
}

impl VaLibrary {
    pub const XLIB: &'static str = "libX11.so.6";
    pub const LIBVA: &'static str = "libva.so.2";
    pub const LIBVA_X11: &'static str = "libva-x11.so.2";

    /// Load the libraries from the standard system search path.
    pub fn load() -> Result<Self, VaLoadError> {
        Self::load_named(Self::XLIB, Self::LIBVA, Self::LIBVA_X11)
    }

    /// Load libva and libva-x11 from `dir` (non-standard installs). Xlib
    /// still comes from the system path.
    pub fn load_from(dir: &Path) -> Result<Self, VaLoadError> {
        let libva = dir.join(Self::LIBVA);
        let libva_x11 = dir.join(Self::LIBVA_X11);
        Self::load_named(Self::XLIB, &libva, &libva_x11)
    }

    fn load_named(
        xlib: impl AsRef<std::ffi::OsStr>,
        libva: impl AsRef<std::ffi::OsStr>,
        libva_x11: impl AsRef<std::ffi::OsStr>,
    ) -> Result<Self, VaLoadError> {
        let open = |name: &std::ffi::OsStr| {
            info!(library = %name.to_string_lossy(), "Loading VA library");
            // SAFETY: loading well-known system libraries whose initialisers
            // only register driver entry points.
            unsafe { Library::new(name) }.map_err(|e| {
                VaLoadError::LibraryNotFound(format!(
                    "Failed to load {}: {e}. Is libva installed?",
                    name.to_string_lossy()
                ))
            })
        };

        let xlib = open(xlib.as_ref())?;
        let libva = open(libva.as_ref())?;
        let libva_x11 = open(libva_x11.as_ref())?;

        // SAFETY: every signature below matches va.h / va_x11.h / Xlib.h.
        // Each symbol is copied out as a plain function pointer, so no
        // borrow of the libraries outlives this block; the libraries move
        // into the struct alongside the pointers.
        unsafe {
            let lib = Self {
                XOpenDisplay: symbol(&xlib, b"XOpenDisplay\0")?,
                XCloseDisplay: symbol(&xlib, b"XCloseDisplay\0")?,
                vaGetDisplay: symbol(&libva_x11, b"vaGetDisplay\0")?,
                vaPutSurface: symbol(&libva_x11, b"vaPutSurface\0")?,
                vaInitialize: symbol(&libva, b"vaInitialize\0")?,
                vaTerminate: symbol(&libva, b"vaTerminate\0")?,
                vaErrorStr: symbol(&libva, b"vaErrorStr\0")?,
                vaMaxNumProfiles: symbol(&libva, b"vaMaxNumProfiles\0")?,
                vaQueryConfigProfiles: symbol(&libva, b"vaQueryConfigProfiles\0")?,
                vaMaxNumEntrypoints: symbol(&libva, b"vaMaxNumEntrypoints\0")?,
                vaQueryConfigEntrypoints: symbol(&libva, b"vaQueryConfigEntrypoints\0")?,
                vaMaxNumImageFormats: symbol(&libva, b"vaMaxNumImageFormats\0")?,
                vaQueryImageFormats: symbol(&libva, b"vaQueryImageFormats\0")?,
                vaGetConfigAttributes: symbol(&libva, b"vaGetConfigAttributes\0")?,
                vaGetDisplayAttributes: symbol(&libva, b"vaGetDisplayAttributes\0")?,
                vaCreateConfig: symbol(&libva, b"vaCreateConfig\0")?,
                vaDestroyConfig: symbol(&libva, b"vaDestroyConfig\0")?,
                vaCreateContext: symbol(&libva, b"vaCreateContext\0")?,
                vaDestroyContext: symbol(&libva, b"vaDestroyContext\0")?,
                vaCreateSurfaces: symbol(&libva, b"vaCreateSurfaces\0")?,
                vaDestroySurfaces: symbol(&libva, b"vaDestroySurfaces\0")?,
                _xlib: xlib,
                _libva: libva,
                _libva_x11: libva_x11,
            };
            debug!("All VA symbols loaded successfully");
            Ok(lib)
        }
    }

    /// Human-readable text for `status`.
    pub fn error_str(&self, status: VAStatus) -> String {
        // SAFETY: vaErrorStr returns a pointer to a static string for every
        // status value, or NULL on very old drivers.
        unsafe {
            let text = (self.vaErrorStr)(status);
            if text.is_null() {
                format!("unknown error {status}")
            } else {
                CStr::from_ptr(text).to_string_lossy().into_owned()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error type for library loading
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum VaLoadError {
    #[error("VA library not found: {0}")]
    LibraryNotFound(String),

    #[error("Required symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Cannot open X display {0}")]
    DisplayUnavailable(String),

    #[error("vaInitialize() failed: {message} (status {status})")]
    Initialize { status: VAStatus, message: String },
}

/// `Ok(())` for `VA_STATUS_SUCCESS`, otherwise the status code.
pub fn check_va_status(status: VAStatus) -> Result<(), VAStatus> {
    if status == VA_STATUS_SUCCESS {
        Ok(())
    } else {
        Err(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_layouts_match_va_h() {
        assert_eq!(std::mem::size_of::<VAConfigAttrib>(), 8);
        assert_eq!(std::mem::size_of::<VAImageFormat>(), 48);
        assert_eq!(std::mem::size_of::<VADisplayAttribute>(), 36);
    }

    #[test]
    fn status_check() {
        assert_eq!(check_va_status(VA_STATUS_SUCCESS), Ok(()));
        assert_eq!(
            check_va_status(VA_STATUS_ERROR_UNIMPLEMENTED),
            Err(VA_STATUS_ERROR_UNIMPLEMENTED)
        );
    }

    #[test]
    fn unimplemented_status_agrees_with_service_error() {
        assert_eq!(
            VA_STATUS_ERROR_UNIMPLEMENTED,
            vo_common::ServiceError::STATUS_UNIMPLEMENTED
        );
    }

    #[test]
    fn missing_library_is_reported() {
        let err = VaLibrary::load_from(Path::new("/nonexistent/va")).unwrap_err();
        match err {
            // Xlib may be absent on headless machines too.
            VaLoadError::LibraryNotFound(message) => assert!(message.contains("Failed to load")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
