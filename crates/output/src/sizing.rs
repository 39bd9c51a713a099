//! Surface count for a stream.

use vo_common::{CodecFamily, VoError};

use crate::policy::Mapping;
use crate::ring::OUTPUT_SLOTS;

/// Hardware ceiling on surfaces kept in the free-queue.
pub const MAX_VIDEO_SURFACES: usize = 21;

/// One decode target plus the codec's full reference window.
fn base_surface_count(family: CodecFamily) -> usize {
    1 + family.max_reference_frames()
}

/// Smallest indirect pool that keeps recycling going: every output slot
/// full plus the surface the decoder is writing.
pub const MIN_INDIRECT_SURFACES: usize = OUTPUT_SLOTS + 1;

/// Number of surfaces to allocate for `family` under `mapping`.
///
/// Direct mapping uses the base count as is. Indirect mapping doubles it, so
/// surfaces still held by the output ring do not starve the decoder, and
/// clamps the result to `ceiling`. A ceiling below
/// [`MIN_INDIRECT_SURFACES`] is rejected.
pub fn surface_count(family: CodecFamily, mapping: Mapping, ceiling: usize) -> Result<usize, VoError> {
    let base = base_surface_count(family);
    let count = match mapping {
        Mapping::Direct => base,
        Mapping::Indirect => (2 * base).min(ceiling),
    };

    if count == 0 {
        return Err(VoError::ZeroSizedPool { family, ceiling });
    }
    if mapping == Mapping::Indirect && count < MIN_INDIRECT_SURFACES {
        return Err(VoError::CeilingTooLow {
            ceiling,
            minimum: MIN_INDIRECT_SURFACES,
        });
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_counts() {
        let size = |family, mapping| surface_count(family, mapping, MAX_VIDEO_SURFACES).unwrap();

        assert_eq!(size(CodecFamily::Mpeg2, Mapping::Direct), 3);
        assert_eq!(size(CodecFamily::Mpeg2, Mapping::Indirect), 6);
        assert_eq!(size(CodecFamily::H264, Mapping::Direct), 17);
        assert_eq!(size(CodecFamily::H264, Mapping::Indirect), 21);
        assert_eq!(size(CodecFamily::Mpeg4, Mapping::Indirect), 6);
        assert_eq!(size(CodecFamily::Vc1, Mapping::Direct), 3);
    }

    #[test]
    fn ceiling_only_applies_to_indirect() {
        assert_eq!(surface_count(CodecFamily::H264, Mapping::Direct, 4).unwrap(), 17);
        assert_eq!(surface_count(CodecFamily::H264, Mapping::Indirect, 4).unwrap(), 4);
        assert_eq!(surface_count(CodecFamily::Mpeg2, Mapping::Direct, 1).unwrap(), 3);
    }

    #[test]
    fn ceiling_must_cover_the_output_ring() {
        for ceiling in [1, 2] {
            assert_eq!(
                surface_count(CodecFamily::Mpeg2, Mapping::Indirect, ceiling),
                Err(VoError::CeilingTooLow { ceiling, minimum: 3 })
            );
        }
        assert_eq!(surface_count(CodecFamily::Mpeg2, Mapping::Indirect, 3).unwrap(), 3);
    }

    #[test]
    fn zero_ceiling_is_rejected() {
        let err = surface_count(CodecFamily::Mpeg2, Mapping::Indirect, 0).unwrap_err();
        assert_eq!(
            err,
            VoError::ZeroSizedPool {
                family: CodecFamily::Mpeg2,
                ceiling: 0
            }
        );
    }
}
