//! Opaque handles and geometry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque id of a hardware-owned decode/display surface (`VASurfaceID`).
///
/// Handles are created in one batch by the acceleration service when a
/// stream is configured and destroyed in the same batch on teardown. They
/// carry no ownership; the pool that received the batch decides who may use
/// a handle at any given moment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceHandle(u32);

impl SurfaceHandle {
    /// `VA_INVALID_SURFACE`. Never handed out by a pool.
    pub const INVALID_RAW: u32 = 0xFFFF_FFFF;

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Opaque id of a hardware decode context created over a surface batch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DecodeContextId(pub u32);

/// Native window the display collaborator presents into (an X11 drawable).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WindowId(pub u64);

/// Width/height pair in pixels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned rectangle in pixels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle covering `size` at the origin.
    pub const fn of_size(size: Resolution) -> Self {
        Self::new(0, 0, size.width, size.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_handle_formats_as_hex() {
        assert_eq!(SurfaceHandle::new(0x2a).to_string(), "0x0000002a");
        assert_eq!(SurfaceHandle::new(7).raw(), 7);
    }

    #[test]
    fn empty_resolution() {
        assert!(Resolution::new(0, 480).is_empty());
        assert!(!Resolution::new(720, 480).is_empty());
        assert_eq!(Resolution::new(720, 480).to_string(), "720x480");
    }
}
