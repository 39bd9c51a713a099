//! Capability probe: one-shot lookup tables of what the hardware decodes.

use std::collections::HashMap;

use tracing::{debug, warn};
use vo_common::{EntryPoint, ImageFormat, Profile, VideoFormat, VoError};

use crate::service::AccelService;

/// Read-only view of the service's decode capabilities, built at startup.
#[derive(Clone, Debug, Default)]
pub struct CapabilityTable {
    profiles: Vec<Profile>,
    entry_points: HashMap<Profile, Vec<EntryPoint>>,
    image_formats: Vec<ImageFormat>,
}

impl CapabilityTable {
    /// Query profiles, image formats and per-profile entry points.
    ///
    /// A failing top-level probe is a configuration error. A failing entry
    /// point query only empties that profile's row, so streams that need it
    /// are rejected later at configuration.
    pub fn probe<S: AccelService + ?Sized>(service: &mut S) -> Result<Self, VoError> {
        let caps = service.probe_capabilities().map_err(|err| {
            warn!(status = err.status, error = %err, "Capability probe failed");
            VoError::Probe(err)
        })?;

        debug!(count = caps.image_formats.len(), "Image formats available");
        for format in &caps.image_formats {
            debug!(fourcc = %format, "  image format");
        }
        debug!(count = caps.profiles.len(), "Decode profiles available");

        let mut entry_points = HashMap::with_capacity(caps.profiles.len());
        for &profile in &caps.profiles {
            let points = match service.query_entry_points(profile) {
                Ok(points) => points,
                Err(err) => {
                    warn!(?profile, status = err.status, error = %err, "Entry point query failed");
                    Vec::new()
                }
            };
            debug!(?profile, ?points, "  profile");
            entry_points.insert(profile, points);
        }

        Ok(Self {
            profiles: caps.profiles,
            entry_points,
            image_formats: caps.image_formats,
        })
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn image_formats(&self) -> &[ImageFormat] {
        &self.image_formats
    }

    pub fn has_profile(&self, profile: Profile) -> bool {
        self.profiles.contains(&profile)
    }

    /// First candidate profile for `format` the hardware supports.
    pub fn select_profile(&self, format: VideoFormat) -> Option<Profile> {
        format
            .candidate_profiles()
            .iter()
            .copied()
            .find(|&profile| self.has_profile(profile))
    }

    pub fn entry_points(&self, profile: Profile) -> &[EntryPoint] {
        self.entry_points
            .get(&profile)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_entry_point(&self, profile: Profile, entry_point: EntryPoint) -> bool {
        self.entry_points(profile).contains(&entry_point)
    }
}
