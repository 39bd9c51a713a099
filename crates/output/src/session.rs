//! One video output: configuration, surface hand-out, publication and
//! presentation.
//!
//! The decoder drives a [`VideoOutput`] frame by frame:
//!
//! 1. [`configure`](VideoOutput::configure) once per stream (and again on
//!    every format or size change),
//! 2. [`acquire_surface`](VideoOutput::acquire_surface) before decoding a
//!    frame, passing back the surface the last publish retired,
//! 3. [`publish_surface`](VideoOutput::publish_surface) once the frame is
//!    decoded, keeping the retired surface for step 2,
//! 4. [`flip_page`](VideoOutput::flip_page) to show it.
//!
//! Fatal pool errors mark the session aborted. Every pool operation then
//! returns [`VoError::SessionAborted`] until the next successful
//! `configure`.

use serde::Serialize;
use tracing::{debug, error, info, warn};
use vo_common::{
    rt_format, CodecFamily, DecodeContextId, EntryPoint, Profile, Resolution, SurfaceHandle,
    VideoFormat, VoError, VoResult,
};

use crate::options::OutputOptions;
use crate::policy::{Mapping, MappingPolicy, PolicyResolver};
use crate::pool::SurfacePool;
use crate::present::{PresentPath, Presenter, WindowGeometry};
use crate::probe::CapabilityTable;
use crate::ring::OutputSlotRing;
use crate::service::{AccelService, DisplayEvent};
use crate::sizing::surface_count;

/// What was set up for the current stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PoolConfiguration {
    pub format: VideoFormat,
    pub family: CodecFamily,
    pub profile: Profile,
    pub mapping: Mapping,
    pub surface_count: usize,
    pub resolution: Resolution,
}

/// Capabilities advertised for an accelerated image format.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FormatSupport {
    pub format: VideoFormat,
    /// The service scales on present, in both directions.
    pub hardware_scaling: bool,
    /// On-screen display can be drawn over the video.
    pub osd: bool,
    /// Frames must arrive whole, not slice by slice.
    pub whole_frames_only: bool,
}

/// Counters for one output, across all of its streams.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Surfaces handed to the output ring.
    pub frames_published: u64,
    /// Presents that reached the display.
    pub frames_presented: u64,
    /// Presents that failed and were dropped.
    pub present_failures: u64,
    /// Surfaces returned through the free-queue.
    pub surfaces_recycled: u64,
    /// Successful `configure` calls.
    pub configurations: u64,
    /// Surfaces in the current pool (0 when unconfigured).
    pub surfaces: usize,
    pub aborted: bool,
}

#[derive(Debug)]
struct Stream {
    config: PoolConfiguration,
    pool: SurfacePool,
    context: DecodeContextId,
}

#[derive(Debug)]
pub struct VideoOutput<S: AccelService> {
    service: S,
    options: OutputOptions,
    caps: CapabilityTable,
    resolver: PolicyResolver,
    stream: Option<Stream>,
    ring: OutputSlotRing,
    presenter: Presenter,
    aborted: bool,
    frames_published: u64,
    recycled_before: u64,
    configurations: u64,
}

impl<S: AccelService> VideoOutput<S> {
    /// Probe the service and get ready for the first `configure`.
    pub fn new(mut service: S, window: WindowGeometry, options: OutputOptions) -> VoResult<Self> {
        let caps = CapabilityTable::probe(&mut service)?;
        let path = options.present_path();

        info!(
            profiles = caps.profiles().len(),
            image_formats = caps.image_formats().len(),
            policy = ?options.mapping,
            ?path,
            max_surfaces = options.max_surfaces,
            "Video output ready"
        );

        Ok(Self {
            service,
            resolver: PolicyResolver::new(options.mapping),
            caps,
            stream: None,
            ring: OutputSlotRing::new(),
            presenter: Presenter::new(path, window),
            options,
            aborted: false,
            frames_published: 0,
            recycled_before: 0,
            configurations: 0,
        })
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Set up surfaces and a decode context for a `width` x `height` stream
    /// of `format`.
    ///
    /// Whatever the previous stream held is destroyed first. On error the
    /// output is left unconfigured and no surfaces stay allocated.
    pub fn configure(
        &mut self,
        width: u32,
        height: u32,
        format: VideoFormat,
    ) -> VoResult<PoolConfiguration> {
        self.teardown();

        let resolution = Resolution::new(width, height);
        if resolution.is_empty() {
            return Err(VoError::InvalidDimensions { width, height });
        }

        let entry_point = format.entry_point();
        if entry_point != EntryPoint::Vld {
            warn!(%format, ?entry_point, "Only VLD decoding is supported");
            return Err(VoError::UnsupportedEntryPoint {
                format,
                entry_point,
            });
        }

        let profile = self.caps.select_profile(format).ok_or_else(|| {
            warn!(%format, "No matching hardware profile");
            VoError::UnsupportedProfile(format)
        })?;
        if !self.caps.has_entry_point(profile, entry_point) {
            warn!(%format, ?profile, "Profile has no VLD entry point");
            return Err(VoError::UnsupportedEntryPoint {
                format,
                entry_point,
            });
        }

        let rt_formats = self
            .service
            .query_rt_formats(profile, entry_point)
            .map_err(|err| {
                error!(status = err.status, error = %err, "Render target query failed");
                VoError::Service(err)
            })?;
        if rt_formats & rt_format::YUV420 == 0 {
            warn!(?profile, rt_formats, "YUV 4:2:0 render targets unavailable");
            return Err(VoError::UnsupportedChroma(profile));
        }

        let family = format.family();
        let mapping = self.resolver.resolve(&mut self.service);
        let count = surface_count(family, mapping, self.options.max_surfaces)?;

        let surfaces = self
            .service
            .create_surfaces(count, width, height, rt_format::YUV420)
            .map_err(|err| {
                error!(surfaces = count, status = err.status, error = %err, "Surface creation failed");
                VoError::Service(err)
            })?;

        let context = match self.service.create_decode_context(
            profile,
            entry_point,
            width,
            height,
            &surfaces,
        ) {
            Ok(context) => context,
            Err(err) => {
                error!(status = err.status, error = %err, "Decode context creation failed");
                self.service.destroy_surfaces(&surfaces);
                return Err(VoError::Service(err));
            }
        };

        let config = PoolConfiguration {
            format,
            family,
            profile,
            mapping,
            surface_count: surfaces.len(),
            resolution,
        };

        info!(
            %format,
            ?profile,
            %mapping,
            surfaces = config.surface_count,
            %resolution,
            "Video output configured"
        );

        self.stream = Some(Stream {
            config,
            pool: SurfacePool::new(surfaces, mapping),
            context,
        });
        self.presenter.set_image(resolution);
        self.aborted = false;
        self.configurations += 1;

        Ok(config)
    }

    /// [`configure`](Self::configure) under `policy`. The policy replaces
    /// the one from [`OutputOptions`] for this and every later stream.
    pub fn configure_with_policy(
        &mut self,
        width: u32,
        height: u32,
        format: VideoFormat,
        policy: MappingPolicy,
    ) -> VoResult<PoolConfiguration> {
        if policy != self.resolver.policy() {
            debug!(from = ?self.resolver.policy(), to = ?policy, "Mapping policy changed");
        }
        self.resolver.set_policy(policy);
        self.configure(width, height, format)
    }

    /// Mapping policy the next `configure` resolves.
    pub fn mapping_policy(&self) -> MappingPolicy {
        self.resolver.policy()
    }

    /// [`configure`](Self::configure) from a raw image format code, as the
    /// host player reports it.
    pub fn configure_raw(
        &mut self,
        width: u32,
        height: u32,
        raw_format: u32,
    ) -> VoResult<PoolConfiguration> {
        match VideoFormat::try_from(raw_format) {
            Ok(format) => self.configure(width, height, format),
            Err(err) => {
                warn!(format = format_args!("0x{raw_format:08x}"), "Not an accelerated format");
                self.teardown();
                Err(err)
            }
        }
    }

    /// Destroy the current stream: decode context, then surfaces. The ring
    /// is emptied and the mapping decision forgotten.
    fn teardown(&mut self) {
        self.ring.clear();
        self.resolver.invalidate();

        let Some(stream) = self.stream.take() else {
            return;
        };

        self.service.destroy_decode_context(stream.context);
        self.recycled_before += stream.pool.recycled();
        let surfaces = stream.pool.into_surfaces();
        self.service.destroy_surfaces(&surfaces);

        debug!(
            format = %stream.config.format,
            surfaces = surfaces.len(),
            "Stream resources destroyed"
        );
    }

    /// Release every hardware resource. The output can be configured again
    /// afterwards.
    pub fn shutdown(&mut self) {
        self.teardown();
    }

    // -----------------------------------------------------------------------
    // Frame flow
    // -----------------------------------------------------------------------

    fn active_stream(aborted: bool, stream: &mut Option<Stream>) -> VoResult<&mut Stream> {
        if aborted {
            return Err(VoError::SessionAborted);
        }
        stream.as_mut().ok_or(VoError::NotConfigured)
    }

    fn abort_on_fatal<T>(&mut self, result: VoResult<T>) -> VoResult<T> {
        if let Err(err) = &result {
            if err.is_fatal() {
                error!(error = %err, "Fatal surface pool error, session aborted");
                self.aborted = true;
            }
        }
        result
    }

    /// Surface the decoder should render `frame_identity` into.
    ///
    /// `previous` is the surface the last [`publish_surface`](Self::publish_surface)
    /// retired, if any. Under indirect mapping it is recycled before a free
    /// surface is taken.
    pub fn acquire_surface(
        &mut self,
        frame_identity: usize,
        previous: Option<SurfaceHandle>,
    ) -> VoResult<SurfaceHandle> {
        let ring = &self.ring;
        let result = Self::active_stream(self.aborted, &mut self.stream).and_then(|stream| {
            if let Some(previous) = previous {
                if stream.pool.mapping() == Mapping::Indirect && ring.holds(previous) {
                    return Err(VoError::ReleasedWhileDisplayed(previous));
                }
            }
            stream.pool.acquire(frame_identity, previous)
        });
        self.abort_on_fatal(result)
    }

    /// Hand a decoded surface to the output ring. Returns the surface it
    /// displaced, which the decoder passes to its next acquire.
    pub fn publish_surface(&mut self, surface: SurfaceHandle) -> VoResult<Option<SurfaceHandle>> {
        let result = Self::active_stream(self.aborted, &mut self.stream).and_then(|stream| {
            if !stream.pool.contains(surface) {
                return Err(VoError::ForeignSurface(surface));
            }
            if stream.pool.is_free(surface) {
                return Err(VoError::PublishedWhileFree(surface));
            }
            Ok(())
        });
        self.abort_on_fatal(result)?;

        let retired = self.ring.publish(surface);
        self.frames_published += 1;
        debug!(%surface, retired = ?retired.map(|s| s.raw()), "Published surface");
        Ok(retired)
    }

    /// Present the most recently published surface. Returns whether it
    /// reached the display; failures are logged and counted only.
    pub fn flip_page(&mut self) -> bool {
        let current = self.displayed();
        self.presenter.present(&mut self.service, current)
    }

    pub fn on_display_event(&mut self, event: DisplayEvent) -> bool {
        let current = self.displayed();
        self.presenter.handle_event(&mut self.service, event, current)
    }

    /// Surface in the current output slot, if a stream is configured.
    fn displayed(&self) -> Option<SurfaceHandle> {
        self.stream.as_ref().and_then(|_| self.ring.current())
    }

    pub fn pause(&mut self) {
        debug!("Presentation paused");
        self.presenter.pause();
    }

    pub fn resume(&mut self) {
        debug!("Presentation resumed");
        self.presenter.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.presenter.is_paused()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Whether `raw_format` is an accelerated format this output accepts.
    /// IDCT and motion-compensation formats are not.
    pub fn query_format(&self, raw_format: u32) -> Option<FormatSupport> {
        let format = VideoFormat::from_raw(raw_format)?;
        if format.entry_point() != EntryPoint::Vld {
            return None;
        }
        Some(FormatSupport {
            format,
            hardware_scaling: true,
            osd: true,
            whole_frames_only: true,
        })
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.caps
    }

    pub fn configuration(&self) -> Option<PoolConfiguration> {
        self.stream.as_ref().map(|stream| stream.config)
    }

    /// Decode context over the current surface batch.
    pub fn decode_context(&self) -> Option<DecodeContextId> {
        self.stream.as_ref().map(|stream| stream.context)
    }

    /// The current surface batch, in creation order.
    pub fn surfaces(&self) -> &[SurfaceHandle] {
        self.stream
            .as_ref()
            .map(|stream| stream.pool.surfaces())
            .unwrap_or(&[])
    }

    /// Surfaces queued for reuse, oldest first. Empty under direct mapping.
    pub fn free_surfaces(&self) -> Vec<SurfaceHandle> {
        self.stream
            .as_ref()
            .map(|stream| stream.pool.free_surfaces())
            .unwrap_or_default()
    }

    /// Surfaces held by the output ring, oldest first.
    pub fn displayed_surfaces(&self) -> Vec<SurfaceHandle> {
        self.ring.occupied().collect()
    }

    pub fn present_path(&self) -> PresentPath {
        self.presenter.path()
    }

    pub fn presenter(&self) -> &Presenter {
        &self.presenter
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    pub fn stats(&self) -> SessionStats {
        let current_recycled = self
            .stream
            .as_ref()
            .map_or(0, |stream| stream.pool.recycled());

        SessionStats {
            frames_published: self.frames_published,
            frames_presented: self.presenter.presented(),
            present_failures: self.presenter.failures(),
            surfaces_recycled: self.recycled_before + current_recycled,
            configurations: self.configurations,
            surfaces: self.surfaces().len(),
            aborted: self.aborted,
        }
    }
}

impl<S: AccelService> Drop for VideoOutput<S> {
    fn drop(&mut self) {
        self.teardown();

        info!(
            frames_published = self.frames_published,
            frames_presented = self.presenter.presented(),
            present_failures = self.presenter.failures(),
            "Video output closed"
        );
    }
}
