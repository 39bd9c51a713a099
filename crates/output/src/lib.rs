//! VA video output: surface pool allocation and double-buffered presentation.
//!
//! The crate sits between a hardware decoder and a display. The decoder
//! borrows surfaces from a fixed pool, decodes into them, and publishes them
//! for display; the display stage presents the most recently published
//! surface. No reference counting is involved. A surface becomes reusable
//! only when a later publish displaces it from the two-slot output ring, and
//! the decoder hands that displaced surface back on its next acquire.
//!
//! ```text
//! probe ──► sizing ──► SurfacePool ──acquire──► decoder (external)
//!                          ▲                        │ publish
//!                          │ previous_handle        ▼
//!                          └──── retired ◄──── OutputSlotRing ──► Presenter
//! ```
//!
//! [`VideoOutput`] ties the pieces together for one output; it is generic
//! over the [`AccelService`] that owns the hardware.

pub mod options;
pub mod policy;
pub mod pool;
pub mod present;
pub mod probe;
pub mod ring;
pub mod service;
pub mod session;
pub mod simulated;
pub mod sizing;

pub use options::{OptionsError, OutputOptions};
pub use policy::{Mapping, MappingPolicy, PolicyResolver};
pub use pool::{FreeQueue, SurfacePool};
pub use present::{fit_output, PresentPath, Presenter, TextureTransfer, WindowGeometry};
pub use probe::CapabilityTable;
pub use ring::{OutputSlotRing, OUTPUT_SLOTS};
pub use service::{AccelService, Capabilities, DisplayEvent};
pub use session::{FormatSupport, PoolConfiguration, SessionStats, VideoOutput};
pub use simulated::SimulatedService;
pub use sizing::{surface_count, MAX_VIDEO_SURFACES, MIN_INDIRECT_SURFACES};
