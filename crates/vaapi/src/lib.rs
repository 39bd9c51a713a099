//! libva backend for the VA video output.
//!
//! [`VaapiService`] implements [`vo_output::AccelService`] on an X11
//! display. libva, libva-x11 and Xlib are loaded at runtime, so a missing
//! driver shows up as a [`VaLoadError`] instead of a link failure.
//!
//! ```no_run
//! use vo_output::{OutputOptions, VideoOutput, WindowGeometry};
//! use vo_vaapi::{VaLibrary, VaapiService};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = VaapiService::open(VaLibrary::load()?, None)?;
//! let window = WindowGeometry::new(vo_common::WindowId(0x0420_0007), 1280, 720);
//! let mut output = VideoOutput::new(service, window, OutputOptions::default())?;
//! output.configure(1920, 1080, vo_common::VideoFormat::H264)?;
//! # Ok(())
//! # }
//! ```

pub mod ffi;
pub mod service;

pub use ffi::{VaLibrary, VaLoadError};
pub use service::VaapiService;
