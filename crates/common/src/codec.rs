//! Accelerated image formats, codec families and VA decode profiles.
//!
//! A host player announces a hardware-decoded stream with a raw image format
//! code (`'V','A'` in the top half, the codec in bits 4..8 and a variant in
//! the low nibble). Each format belongs to one [`CodecFamily`], which decides
//! how many reference surfaces the stream needs, and maps to an ordered list
//! of VA profiles to try against the hardware.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VoError;

// ---------------------------------------------------------------------------
// Raw format codes
// ---------------------------------------------------------------------------

/// Raw image format codes for VA-accelerated streams.
pub mod raw {
    /// `'V','A'` marker in the upper 16 bits.
    pub const VAAPI: u32 = 0x5641_0000;
    pub const VAAPI_MASK: u32 = 0xFFFF_0000;
    pub const CODEC_MASK: u32 = 0x0000_00F0;

    pub const CODEC_MPEG2: u32 = 0x10;
    pub const CODEC_MPEG4: u32 = 0x20;
    pub const CODEC_H264: u32 = 0x30;
    pub const CODEC_VC1: u32 = 0x40;

    pub const MPEG2: u32 = VAAPI | CODEC_MPEG2;
    pub const MPEG2_IDCT: u32 = VAAPI | CODEC_MPEG2 | 1;
    pub const MPEG2_MOCO: u32 = VAAPI | CODEC_MPEG2 | 2;
    pub const MPEG4: u32 = VAAPI | CODEC_MPEG4;
    pub const H263: u32 = VAAPI | CODEC_MPEG4 | 1;
    pub const H264: u32 = VAAPI | CODEC_H264;
    pub const VC1: u32 = VAAPI | CODEC_VC1;
    pub const WMV3: u32 = VAAPI | CODEC_VC1 | 1;

    /// Whether `code` carries the VA marker at all.
    pub fn is_vaapi(code: u32) -> bool {
        code & VAAPI_MASK == VAAPI
    }
}

/// Render-target chroma formats (`VA_RT_FORMAT_*`).
pub mod rt_format {
    pub const YUV420: u32 = 0x0000_0001;
    pub const YUV422: u32 = 0x0000_0002;
    pub const YUV444: u32 = 0x0000_0004;
}

// ---------------------------------------------------------------------------
// Codec family
// ---------------------------------------------------------------------------

/// Codec family of an accelerated stream. Determines the reference window,
/// and therefore the base surface count.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecFamily {
    Mpeg2,
    Mpeg4,
    H264,
    Vc1,
}

impl CodecFamily {
    /// Maximum number of reference frames a decoder may hold.
    pub fn max_reference_frames(self) -> usize {
        match self {
            Self::Mpeg2 | Self::Mpeg4 | Self::Vc1 => 2,
            Self::H264 => 16,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Mpeg2 => "MPEG-2",
            Self::Mpeg4 => "MPEG-4",
            Self::H264 => "H.264",
            Self::Vc1 => "VC-1",
        }
    }
}

impl fmt::Display for CodecFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ---------------------------------------------------------------------------
// VA profiles and entry points
// ---------------------------------------------------------------------------

/// Decode profile. Matches `VAProfile` from `va/va.h`.
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Profile {
    Mpeg2Simple = 0,
    Mpeg2Main = 1,
    Mpeg4Simple = 2,
    Mpeg4AdvancedSimple = 3,
    Mpeg4Main = 4,
    H264Baseline = 5,
    H264Main = 6,
    H264High = 7,
    Vc1Simple = 8,
    Vc1Main = 9,
    Vc1Advanced = 10,
}

impl Profile {
    pub fn from_raw(value: i32) -> Option<Self> {
        Some(match value {
            0 => Self::Mpeg2Simple,
            1 => Self::Mpeg2Main,
            2 => Self::Mpeg4Simple,
            3 => Self::Mpeg4AdvancedSimple,
            4 => Self::Mpeg4Main,
            5 => Self::H264Baseline,
            6 => Self::H264Main,
            7 => Self::H264High,
            8 => Self::Vc1Simple,
            9 => Self::Vc1Main,
            10 => Self::Vc1Advanced,
            _ => return None,
        })
    }

    pub fn raw(self) -> i32 {
        self as i32
    }
}

/// Decode entry point. Matches `VAEntrypoint`.
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    /// Full bitstream decode (variable length decoding onwards).
    Vld = 1,
    Izz = 2,
    Idct = 3,
    MoComp = 4,
    Deblocking = 5,
}

impl EntryPoint {
    pub fn from_raw(value: i32) -> Option<Self> {
        Some(match value {
            1 => Self::Vld,
            2 => Self::Izz,
            3 => Self::Idct,
            4 => Self::MoComp,
            5 => Self::Deblocking,
            _ => return None,
        })
    }

    pub fn raw(self) -> i32 {
        self as i32
    }
}

/// A surface/image pixel format reported by the service, identified by fourcc.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageFormat {
    pub fourcc: u32,
}

impl ImageFormat {
    pub const fn from_fourcc(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self {
            fourcc: a as u32 | (b as u32) << 8 | (c as u32) << 16 | (d as u32) << 24,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for shift in [0, 8, 16, 24] {
            let byte = (self.fourcc >> shift) as u8;
            let ch = if byte.is_ascii_graphic() { byte as char } else { '?' };
            write!(f, "{ch}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Video format
// ---------------------------------------------------------------------------

/// One of the accelerated stream formats a host player can request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoFormat {
    Mpeg2,
    Mpeg2Idct,
    Mpeg2MoComp,
    Mpeg4,
    H263,
    H264,
    Wmv3,
    Vc1,
}

const MPEG2_PROFILES: &[Profile] = &[Profile::Mpeg2Main, Profile::Mpeg2Simple];
const MPEG4_PROFILES: &[Profile] = &[
    Profile::Mpeg4Main,
    Profile::Mpeg4AdvancedSimple,
    Profile::Mpeg4Simple,
];
const H264_PROFILES: &[Profile] = &[Profile::H264High, Profile::H264Main, Profile::H264Baseline];
const WMV3_PROFILES: &[Profile] = &[Profile::Vc1Main, Profile::Vc1Simple];
const VC1_PROFILES: &[Profile] = &[Profile::Vc1Advanced];

impl VideoFormat {
    pub const ALL: [VideoFormat; 8] = [
        Self::Mpeg2,
        Self::Mpeg2Idct,
        Self::Mpeg2MoComp,
        Self::Mpeg4,
        Self::H263,
        Self::H264,
        Self::Wmv3,
        Self::Vc1,
    ];

    /// Decode a raw image format code. Returns `None` for anything that is
    /// not one of the known accelerated formats.
    pub fn from_raw(code: u32) -> Option<Self> {
        Some(match code {
            raw::MPEG2 => Self::Mpeg2,
            raw::MPEG2_IDCT => Self::Mpeg2Idct,
            raw::MPEG2_MOCO => Self::Mpeg2MoComp,
            raw::MPEG4 => Self::Mpeg4,
            raw::H263 => Self::H263,
            raw::H264 => Self::H264,
            raw::VC1 => Self::Vc1,
            raw::WMV3 => Self::Wmv3,
            _ => return None,
        })
    }

    pub fn raw(self) -> u32 {
        match self {
            Self::Mpeg2 => raw::MPEG2,
            Self::Mpeg2Idct => raw::MPEG2_IDCT,
            Self::Mpeg2MoComp => raw::MPEG2_MOCO,
            Self::Mpeg4 => raw::MPEG4,
            Self::H263 => raw::H263,
            Self::H264 => raw::H264,
            Self::Vc1 => raw::VC1,
            Self::Wmv3 => raw::WMV3,
        }
    }

    pub fn family(self) -> CodecFamily {
        match self {
            Self::Mpeg2 | Self::Mpeg2Idct | Self::Mpeg2MoComp => CodecFamily::Mpeg2,
            Self::Mpeg4 | Self::H263 => CodecFamily::Mpeg4,
            Self::H264 => CodecFamily::H264,
            Self::Wmv3 | Self::Vc1 => CodecFamily::Vc1,
        }
    }

    /// Entry point the format needs. Only [`EntryPoint::Vld`] is driven by
    /// this output; IDCT and motion-compensation formats are rejected at
    /// configuration.
    pub fn entry_point(self) -> EntryPoint {
        match self {
            Self::Mpeg2Idct => EntryPoint::Idct,
            Self::Mpeg2MoComp => EntryPoint::MoComp,
            _ => EntryPoint::Vld,
        }
    }

    /// Candidate decode profiles, most capable first.
    pub fn candidate_profiles(self) -> &'static [Profile] {
        match self {
            Self::Mpeg2 | Self::Mpeg2Idct | Self::Mpeg2MoComp => MPEG2_PROFILES,
            Self::Mpeg4 | Self::H263 => MPEG4_PROFILES,
            Self::H264 => H264_PROFILES,
            Self::Wmv3 => WMV3_PROFILES,
            Self::Vc1 => VC1_PROFILES,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Mpeg2 => "mpeg2",
            Self::Mpeg2Idct => "mpeg2_idct",
            Self::Mpeg2MoComp => "mpeg2_mo_comp",
            Self::Mpeg4 => "mpeg4",
            Self::H263 => "h263",
            Self::H264 => "h264",
            Self::Wmv3 => "wmv3",
            Self::Vc1 => "vc1",
        }
    }
}

impl TryFrom<u32> for VideoFormat {
    type Error = VoError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::from_raw(code).ok_or(VoError::UnsupportedFormat(code))
    }
}

impl FromStr for VideoFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.name() == wanted)
            .ok_or_else(|| format!("unknown video format '{s}'"))
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_round_trip_for_every_format() {
        for format in VideoFormat::ALL {
            assert!(raw::is_vaapi(format.raw()));
            assert_eq!(VideoFormat::from_raw(format.raw()), Some(format));
        }
    }

    #[test]
    fn unknown_raw_code_is_rejected() {
        assert_eq!(VideoFormat::from_raw(0x3231_564E), None);
        let err = VideoFormat::try_from(raw::VAAPI | 0x50).unwrap_err();
        assert_eq!(err, VoError::UnsupportedFormat(raw::VAAPI | 0x50));
    }

    #[test]
    fn families_group_variants() {
        assert_eq!(VideoFormat::H263.family(), CodecFamily::Mpeg4);
        assert_eq!(VideoFormat::Wmv3.family(), CodecFamily::Vc1);
        assert_eq!(VideoFormat::Mpeg2MoComp.family(), CodecFamily::Mpeg2);
        assert_eq!(CodecFamily::H264.max_reference_frames(), 16);
    }

    #[test]
    fn wmv3_and_vc1_use_distinct_profiles() {
        assert_eq!(VideoFormat::Wmv3.candidate_profiles(), WMV3_PROFILES);
        assert_eq!(VideoFormat::Vc1.candidate_profiles(), &[Profile::Vc1Advanced]);
        assert_eq!(VideoFormat::H264.candidate_profiles()[0], Profile::H264High);
    }

    #[test]
    fn only_idct_and_moco_leave_vld() {
        assert_eq!(VideoFormat::Mpeg2Idct.entry_point(), EntryPoint::Idct);
        assert_eq!(VideoFormat::Mpeg2MoComp.entry_point(), EntryPoint::MoComp);
        assert_eq!(VideoFormat::Vc1.entry_point(), EntryPoint::Vld);
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("H264".parse::<VideoFormat>(), Ok(VideoFormat::H264));
        assert_eq!(" mpeg2 ".parse::<VideoFormat>(), Ok(VideoFormat::Mpeg2));
        assert!("theora".parse::<VideoFormat>().is_err());
    }

    #[test]
    fn serde_names_match_parse_names() {
        let json = serde_json::to_string(&VideoFormat::Mpeg2MoComp).unwrap();
        assert_eq!(json, "\"mpeg2_mo_comp\"");
        assert_eq!(
            json.trim_matches('"').parse::<VideoFormat>(),
            Ok(VideoFormat::Mpeg2MoComp)
        );
    }

    #[test]
    fn profile_raw_values_match_va_header() {
        assert_eq!(Profile::H264High.raw(), 7);
        assert_eq!(Profile::from_raw(10), Some(Profile::Vc1Advanced));
        assert_eq!(Profile::from_raw(42), None);
        assert_eq!(EntryPoint::from_raw(1), Some(EntryPoint::Vld));
    }

    #[test]
    fn image_format_displays_fourcc() {
        assert_eq!(ImageFormat::from_fourcc(b'N', b'V', b'1', b'2').to_string(), "NV12");
        assert_eq!(ImageFormat { fourcc: 0 }.to_string(), "????");
    }
}
