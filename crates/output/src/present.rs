//! Presentation driver.
//!
//! Presents the ring's current surface through the acceleration service and
//! keeps the output geometry in sync with the window. The presentation path
//! is chosen once, when the output is created:
//!
//! * [`PresentPath::Window`] draws the surface straight into the window.
//! * [`PresentPath::AcceleratedSurface`] hands the surface to the
//!   accelerated rendering path, either by copying it into a texture or by
//!   binding it as one.
//!
//! Present failures never escape this module. They are logged with their
//! status, counted, and the frame is dropped; the next flip tries again with
//! whatever is current then.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vo_common::{Rect, Resolution, SurfaceHandle, VoError, WindowId};

use crate::service::{AccelService, DisplayEvent};

/// How a surface reaches the accelerated rendering path.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureTransfer {
    /// Copy surface contents into the texture.
    #[default]
    Copy,
    /// Bind the surface as the texture's backing store.
    Bind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PresentPath {
    Window,
    AcceleratedSurface(TextureTransfer),
}

/// Window the output draws into, as last reported by the windowing system.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WindowGeometry {
    pub window: WindowId,
    pub size: Resolution,
    pub fullscreen: bool,
}

impl WindowGeometry {
    pub fn new(window: WindowId, width: u32, height: u32) -> Self {
        Self {
            window,
            size: Resolution::new(width, height),
            fullscreen: false,
        }
    }
}

/// Largest rectangle with the image's aspect ratio that fits in `window`,
/// centred. Returns an empty rectangle if either size is empty.
pub fn fit_output(image: Resolution, window: Resolution) -> Rect {
    if image.is_empty() || window.is_empty() {
        return Rect::default();
    }

    let (iw, ih) = (image.width as u64, image.height as u64);
    let (ww, wh) = (window.width as u64, window.height as u64);

    let (width, height) = if ww * ih <= wh * iw {
        (ww, (ih * ww / iw).max(1))
    } else {
        ((iw * wh / ih).max(1), wh)
    };

    Rect::new(
        ((ww - width) / 2) as i32,
        ((wh - height) / 2) as i32,
        width as u32,
        height as u32,
    )
}

#[derive(Debug)]
pub struct Presenter {
    path: PresentPath,
    geometry: WindowGeometry,
    image: Resolution,
    output: Rect,
    paused: bool,
    presented: u64,
    failures: u64,
}

impl Presenter {
    pub fn new(path: PresentPath, geometry: WindowGeometry) -> Self {
        Self {
            path,
            geometry,
            image: Resolution::default(),
            output: Rect::default(),
            paused: false,
            presented: 0,
            failures: 0,
        }
    }

    pub fn path(&self) -> PresentPath {
        self.path
    }

    pub fn geometry(&self) -> WindowGeometry {
        self.geometry
    }

    /// Destination rectangle inside the window.
    pub fn output_rect(&self) -> Rect {
        self.output
    }

    /// Horizontal and vertical border around the image, per side.
    pub fn borders(&self) -> (u32, u32) {
        (self.output.x.max(0) as u32, self.output.y.max(0) as u32)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// New stream size. Clears the paused flag, as a fresh stream starts
    /// playing.
    pub fn set_image(&mut self, image: Resolution) {
        self.image = image;
        self.paused = false;
        self.recompute();
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.geometry.size = Resolution::new(width, height);
        self.recompute();
    }

    fn recompute(&mut self) {
        self.output = fit_output(self.image, self.geometry.size);
        debug!(
            window = %self.geometry.size,
            image = %self.image,
            x = self.output.x,
            y = self.output.y,
            width = self.output.width,
            height = self.output.height,
            "Output rectangle updated"
        );
    }

    /// Present `surface`, absorbing failures. Returns whether the surface
    /// reached the display. `None` (nothing decoded yet) is a no-op.
    pub fn present<S: AccelService + ?Sized>(
        &mut self,
        service: &mut S,
        surface: Option<SurfaceHandle>,
    ) -> bool {
        let Some(surface) = surface else {
            return false;
        };

        match self.try_present(service, surface) {
            Ok(()) => {
                self.presented += 1;
                true
            }
            Err(err) => {
                self.failures += 1;
                warn!(%surface, error = %err, "Dropping frame after failed present");
                false
            }
        }
    }

    fn try_present<S: AccelService + ?Sized>(
        &mut self,
        service: &mut S,
        surface: SurfaceHandle,
    ) -> Result<(), VoError> {
        match self.path {
            PresentPath::Window => service
                .present(
                    surface,
                    self.geometry.window,
                    Rect::of_size(self.image),
                    self.output,
                )
                .map_err(VoError::Presentation),
            PresentPath::AcceleratedSurface(transfer) => {
                match service.present_accelerated(surface, transfer, self.output) {
                    Ok(()) => Ok(()),
                    Err(err) if transfer == TextureTransfer::Copy && err.is_unimplemented() => {
                        warn!("Texture copy not implemented, binding surfaces from now on");
                        self.path = PresentPath::AcceleratedSurface(TextureTransfer::Bind);
                        Err(VoError::Presentation(err))
                    }
                    Err(err) => Err(VoError::Presentation(err)),
                }
            }
        }
    }

    /// React to a window notification. Geometry changes are applied
    /// immediately; while paused, `current` is presented again so the
    /// window is not left blank. Returns whether a re-present happened.
    pub fn handle_event<S: AccelService + ?Sized>(
        &mut self,
        service: &mut S,
        event: DisplayEvent,
        current: Option<SurfaceHandle>,
    ) -> bool {
        match event {
            DisplayEvent::Resize { width, height } => self.resize(width, height),
            DisplayEvent::Fullscreen {
                enabled,
                width,
                height,
            } => {
                self.geometry.fullscreen = enabled;
                self.resize(width, height);
            }
            DisplayEvent::Expose => {}
        }

        if self.paused {
            self.present(service, current)
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{PresentRecord, SimulatedService};

    fn presenter(path: PresentPath) -> Presenter {
        let mut presenter = Presenter::new(path, WindowGeometry::new(WindowId(7), 1280, 720));
        presenter.set_image(Resolution::new(1920, 1080));
        presenter
    }

    #[test]
    fn fit_keeps_aspect_and_centres() {
        let hd = Resolution::new(1920, 1080);
        assert_eq!(fit_output(hd, Resolution::new(1280, 720)), Rect::new(0, 0, 1280, 720));
        assert_eq!(fit_output(hd, Resolution::new(1280, 1024)), Rect::new(0, 152, 1280, 720));
        assert_eq!(
            fit_output(Resolution::new(720, 480), Resolution::new(1920, 1080)),
            Rect::new(150, 0, 1620, 1080)
        );
        assert_eq!(fit_output(hd, Resolution::new(0, 0)), Rect::default());
    }

    #[test]
    fn present_none_is_a_no_op() {
        let mut service = SimulatedService::new();
        let mut presenter = presenter(PresentPath::Window);
        assert!(!presenter.present(&mut service, None));
        assert!(service.presents().is_empty());
    }

    #[test]
    fn window_present_uses_output_rect() {
        let mut service = SimulatedService::new();
        let mut presenter = presenter(PresentPath::Window);
        let surface = SurfaceHandle::new(3);

        assert!(presenter.present(&mut service, Some(surface)));
        assert_eq!(
            service.presents(),
            &[PresentRecord::Window {
                surface,
                window: WindowId(7),
                src: Rect::new(0, 0, 1920, 1080),
                dst: Rect::new(0, 0, 1280, 720),
            }]
        );
        assert_eq!(presenter.presented(), 1);
    }

    #[test]
    fn failed_present_is_counted_not_raised() {
        let mut service = SimulatedService::new().failing_present();
        let mut presenter = presenter(PresentPath::Window);

        assert!(!presenter.present(&mut service, Some(SurfaceHandle::new(1))));
        assert_eq!(presenter.failures(), 1);
        assert_eq!(presenter.presented(), 0);
    }

    #[test]
    fn unimplemented_copy_switches_to_binding() {
        let mut service = SimulatedService::new().without_texture_copy();
        let mut presenter = presenter(PresentPath::AcceleratedSurface(TextureTransfer::Copy));
        let surface = SurfaceHandle::new(9);

        assert!(!presenter.present(&mut service, Some(surface)));
        assert_eq!(
            presenter.path(),
            PresentPath::AcceleratedSurface(TextureTransfer::Bind)
        );
        assert!(presenter.present(&mut service, Some(surface)));
        assert_eq!(service.presents().len(), 1);
    }

    #[test]
    fn expose_repaints_only_while_paused() {
        let mut service = SimulatedService::new();
        let mut presenter = presenter(PresentPath::Window);
        let surface = Some(SurfaceHandle::new(2));

        assert!(!presenter.handle_event(&mut service, DisplayEvent::Expose, surface));
        presenter.pause();
        assert!(presenter.handle_event(&mut service, DisplayEvent::Expose, surface));
        assert_eq!(service.presents().len(), 1);
    }

    #[test]
    fn resize_updates_geometry_and_repaints_when_paused() {
        let mut service = SimulatedService::new();
        let mut presenter = presenter(PresentPath::Window);
        presenter.pause();

        let event = DisplayEvent::Resize {
            width: 1280,
            height: 1024,
        };
        assert!(presenter.handle_event(&mut service, event, Some(SurfaceHandle::new(2))));
        assert_eq!(presenter.output_rect(), Rect::new(0, 152, 1280, 720));
        assert_eq!(presenter.borders(), (0, 152));
    }

    #[test]
    fn fullscreen_records_state() {
        let mut service = SimulatedService::new();
        let mut presenter = presenter(PresentPath::Window);
        let event = DisplayEvent::Fullscreen {
            enabled: true,
            width: 1920,
            height: 1080,
        };

        assert!(!presenter.handle_event(&mut service, event, None));
        assert!(presenter.geometry().fullscreen);
        assert_eq!(presenter.output_rect(), Rect::new(0, 0, 1920, 1080));
    }
}
