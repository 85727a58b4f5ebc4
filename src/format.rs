//! Pixel formats.
//!
//! This module contains the media bus pixel codes accepted by the CSI-2
//! receiver, the pad format negotiation rules, and the mapping from pixel code
//! to the physical format code programmed into a receiver context.

use crate::error::Error;
use bitflags::bitflags;
use csi2_json::{Colorspace, Field, PixelCode};

/// Media bus pixel code.
///
/// This is the numeric code used by V4L2 to describe the format of the pixels
/// on a bus. Only the Bayer 10-bit codes and their DPCM-compressed 8-bit
/// counterparts are supported by the receiver, but any value can be
/// represented so that unsupported requests can be detected.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct MbusCode(pub u32);

impl MbusCode {
    /// Bayer BGGR, 10 bits per sample.
    pub const SBGGR10_1X10: MbusCode = MbusCode(0x3007);
    /// Bayer GRBG, 10 bits DPCM-compressed to 8 bits.
    pub const SGRBG10_DPCM8_1X8: MbusCode = MbusCode(0x3009);
    /// Bayer GRBG, 10 bits per sample.
    pub const SGRBG10_1X10: MbusCode = MbusCode(0x300a);
    /// Bayer BGGR, 10 bits DPCM-compressed to 8 bits.
    pub const SBGGR10_DPCM8_1X8: MbusCode = MbusCode(0x300b);
    /// Bayer GBRG, 10 bits DPCM-compressed to 8 bits.
    pub const SGBRG10_DPCM8_1X8: MbusCode = MbusCode(0x300c);
    /// Bayer RGGB, 10 bits DPCM-compressed to 8 bits.
    pub const SRGGB10_DPCM8_1X8: MbusCode = MbusCode(0x300d);
    /// Bayer GBRG, 10 bits per sample.
    pub const SGBRG10_1X10: MbusCode = MbusCode(0x300e);
    /// Bayer RGGB, 10 bits per sample.
    pub const SRGGB10_1X10: MbusCode = MbusCode(0x300f);

    /// Returns the format family of the code, or `None` if the receiver does
    /// not support it.
    pub fn family(self) -> Option<Family> {
        match self {
            MbusCode::SGRBG10_1X10
            | MbusCode::SRGGB10_1X10
            | MbusCode::SBGGR10_1X10
            | MbusCode::SGBRG10_1X10 => Some(Family::Raw10),
            MbusCode::SGRBG10_DPCM8_1X8
            | MbusCode::SRGGB10_DPCM8_1X8
            | MbusCode::SBGGR10_DPCM8_1X8
            | MbusCode::SGBRG10_DPCM8_1X8 => Some(Family::Raw10Dpcm8),
            _ => None,
        }
    }

    /// Returns the code obtained after DPCM decompression.
    ///
    /// For codes that are not DPCM-compressed this returns the code itself.
    pub fn uncompressed(self) -> MbusCode {
        match self {
            MbusCode::SGRBG10_DPCM8_1X8 => MbusCode::SGRBG10_1X10,
            MbusCode::SRGGB10_DPCM8_1X8 => MbusCode::SRGGB10_1X10,
            MbusCode::SBGGR10_DPCM8_1X8 => MbusCode::SBGGR10_1X10,
            MbusCode::SGBRG10_DPCM8_1X8 => MbusCode::SGBRG10_1X10,
            code => code,
        }
    }
}

impl std::fmt::Display for MbusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match PixelCode::try_from(*self) {
            Ok(code) => write!(f, "{code}"),
            Err(_) => write!(f, "{:#06x}", self.0),
        }
    }
}

impl From<PixelCode> for MbusCode {
    fn from(value: PixelCode) -> MbusCode {
        match value {
            PixelCode::Sgrbg10 => MbusCode::SGRBG10_1X10,
            PixelCode::Sgrbg10Dpcm8 => MbusCode::SGRBG10_DPCM8_1X8,
            PixelCode::Srggb10 => MbusCode::SRGGB10_1X10,
            PixelCode::Srggb10Dpcm8 => MbusCode::SRGGB10_DPCM8_1X8,
            PixelCode::Sbggr10 => MbusCode::SBGGR10_1X10,
            PixelCode::Sbggr10Dpcm8 => MbusCode::SBGGR10_DPCM8_1X8,
            PixelCode::Sgbrg10 => MbusCode::SGBRG10_1X10,
            PixelCode::Sgbrg10Dpcm8 => MbusCode::SGBRG10_DPCM8_1X8,
        }
    }
}

impl TryFrom<MbusCode> for PixelCode {
    type Error = Error;

    fn try_from(value: MbusCode) -> Result<PixelCode, Error> {
        Ok(match value {
            MbusCode::SGRBG10_1X10 => PixelCode::Sgrbg10,
            MbusCode::SGRBG10_DPCM8_1X8 => PixelCode::Sgrbg10Dpcm8,
            MbusCode::SRGGB10_1X10 => PixelCode::Srggb10,
            MbusCode::SRGGB10_DPCM8_1X8 => PixelCode::Srggb10Dpcm8,
            MbusCode::SBGGR10_1X10 => PixelCode::Sbggr10,
            MbusCode::SBGGR10_DPCM8_1X8 => PixelCode::Sbggr10Dpcm8,
            MbusCode::SGBRG10_1X10 => PixelCode::Sgbrg10,
            MbusCode::SGBRG10_DPCM8_1X8 => PixelCode::Sgbrg10Dpcm8,
            code => return Err(Error::UnsupportedFormat(code)),
        })
    }
}

/// Codes accepted on the sink pad, in enumeration order.
pub const SINK_CODES: [MbusCode; 8] = [
    MbusCode::SGRBG10_1X10,
    MbusCode::SGRBG10_DPCM8_1X8,
    MbusCode::SRGGB10_1X10,
    MbusCode::SRGGB10_DPCM8_1X8,
    MbusCode::SBGGR10_1X10,
    MbusCode::SBGGR10_DPCM8_1X8,
    MbusCode::SGBRG10_1X10,
    MbusCode::SGBRG10_DPCM8_1X8,
];

/// Code used on the sink pad when an unsupported code is requested.
pub const DEFAULT_CODE: MbusCode = MbusCode::SGRBG10_1X10;

/// Smallest width and height accepted by the receiver.
pub const MIN_SIZE: u32 = 1;
/// Largest width and height accepted by the receiver.
pub const MAX_SIZE: u32 = 8191;

/// Format family.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Family {
    /// 10-bit samples.
    Raw10,
    /// 10-bit samples DPCM-compressed to 8 bits.
    Raw10Dpcm8,
}

bitflags! {
    /// Receiver output routing.
    ///
    /// Both outputs can be active at the same time. An empty mask is valid and
    /// describes a receiver that is temporarily unrouted.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
    pub struct Output: u8 {
        /// Frames are written to memory.
        const MEMORY = 1 << 0;
        /// Frames are sent to the downstream processing stage.
        const CASCADE = 1 << 1;
    }
}

/// ISP hardware revision.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Revision {
    /// ISP revision 2.0 and older.
    Legacy,
    /// ISP revision 15.0.
    Revised,
}

impl Revision {
    const REVISED: u32 = 0xf0;

    /// Decodes the value of the ISP revision register.
    pub fn from_register(value: u32) -> Revision {
        if value & 0xff == Self::REVISED {
            Revision::Revised
        } else {
            Revision::Legacy
        }
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Revision::Legacy => write!(f, "2.0"),
            Revision::Revised => write!(f, "15.0"),
        }
    }
}

/// Physical format code.
///
/// This is the value programmed in the format field of a receiver context.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct PhysFormat(pub u16);

impl PhysFormat {
    /// Format used when no output is routed.
    pub const OTHERS: PhysFormat = PhysFormat(0);
    /// RAW8.
    pub const RAW8: PhysFormat = PhysFormat(0x2a);
    /// User-defined 8-bit data type 1.
    pub const USERDEF_8BIT_DATA1: PhysFormat = PhysFormat(0x40);
    /// RAW10 expanded to 16 bits.
    pub const RAW10_EXP16: PhysFormat = PhysFormat(0xab);
    /// RAW8 to the video port.
    pub const RAW8_VP: PhysFormat = PhysFormat(0x12a);
    /// RAW10 expanded to 16 bits, also to the video port.
    pub const RAW10_EXP16_VP: PhysFormat = PhysFormat(0x12f);
    /// RAW8 DPCM-decompressed to 10 bits, expanded to 16 bits.
    pub const RAW8_DPCM10_EXP16: PhysFormat = PhysFormat(0x2aa);
    /// User-defined 8-bit data type 1, DPCM-decompressed to 10 bits.
    pub const USERDEF_8BIT_DATA1_DPCM10: PhysFormat = PhysFormat(0x2c0);
    /// RAW8 DPCM-decompressed to 10 bits, to the video port.
    pub const RAW8_DPCM10_VP: PhysFormat = PhysFormat(0x32a);
    /// User-defined 8-bit data type 1, DPCM-decompressed, to the video port.
    pub const USERDEF_8BIT_DATA1_DPCM10_VP: PhysFormat = PhysFormat(0x340);

    /// Returns `true` if the format requires the user-defined data type
    /// mapping.
    pub fn is_user_defined(self) -> bool {
        self.0 & 0x40 != 0
    }
}

// Indexed by [family][output includes cascade][decompress][revised]. A zero
// entry marks a combination the hardware cannot produce.
const FORMAT_MAP: [[[[PhysFormat; 2]; 2]; 2]; 2] = [
    // RAW10
    [
        // memory only
        [
            [PhysFormat::RAW10_EXP16, PhysFormat::RAW10_EXP16],
            [PhysFormat::OTHERS, PhysFormat::OTHERS],
        ],
        // memory and video port
        [
            [PhysFormat::RAW10_EXP16_VP, PhysFormat::RAW10_EXP16_VP],
            [PhysFormat::OTHERS, PhysFormat::OTHERS],
        ],
    ],
    // RAW10 DPCM8
    [
        // memory only
        [
            [PhysFormat::RAW8, PhysFormat::USERDEF_8BIT_DATA1],
            [
                PhysFormat::RAW8_DPCM10_EXP16,
                PhysFormat::USERDEF_8BIT_DATA1_DPCM10,
            ],
        ],
        // memory and video port
        [
            [PhysFormat::RAW8_VP, PhysFormat::RAW8_VP],
            [
                PhysFormat::RAW8_DPCM10_VP,
                PhysFormat::USERDEF_8BIT_DATA1_DPCM10_VP,
            ],
        ],
    ],
];

/// Maps a pixel code to the physical format programmed in a context.
///
/// An `output` with no bits set is valid and yields [`PhysFormat::OTHERS`].
/// Codes outside the supported families, and combinations that the hardware
/// revision cannot produce, return [`Error::UnsupportedFormat`].
pub fn map_format(
    code: MbusCode,
    decompress: bool,
    output: Output,
    revision: Revision,
) -> Result<PhysFormat, Error> {
    let family = code.family().ok_or(Error::UnsupportedFormat(code))?;
    if output.is_empty() {
        return Ok(PhysFormat::OTHERS);
    }
    let family = match family {
        Family::Raw10 => 0,
        Family::Raw10Dpcm8 => 1,
    };
    let dest = usize::from(output.contains(Output::CASCADE));
    let revised = usize::from(revision == Revision::Revised);
    match FORMAT_MAP[family][dest][usize::from(decompress)][revised] {
        PhysFormat::OTHERS => Err(Error::UnsupportedFormat(code)),
        format => Ok(format),
    }
}

/// Receiver pad.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Pad {
    /// Input pad, connected to the sensor.
    Sink,
    /// Output pad, connected to memory and/or the processing stage.
    Source,
}

impl TryFrom<u32> for Pad {
    type Error = Error;

    fn try_from(value: u32) -> Result<Pad, Error> {
        match value {
            0 => Ok(Pad::Sink),
            1 => Ok(Pad::Source),
            _ => Err(Error::InvalidTopology),
        }
    }
}

/// Format of a pad.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PadFormat {
    /// Pixel code.
    pub code: MbusCode,
    /// Width in pixels.
    pub width: u32,
    /// Height in lines.
    pub height: u32,
    /// Colorspace.
    pub colorspace: Colorspace,
    /// Field order.
    pub field: Field,
}

impl Default for PadFormat {
    fn default() -> PadFormat {
        PadFormat {
            code: DEFAULT_CODE,
            width: 0,
            height: 0,
            colorspace: Colorspace::Default,
            field: Field::Any,
        }
    }
}

/// Range of frame sizes supported for a code.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FrameSizeRange {
    /// Minimum width in pixels.
    pub min_width: u32,
    /// Maximum width in pixels.
    pub max_width: u32,
    /// Minimum height in lines.
    pub min_height: u32,
    /// Maximum height in lines.
    pub max_height: u32,
}

/// Adjusts a requested format to what a pad supports.
///
/// On the sink pad, unsupported codes are replaced by [`DEFAULT_CODE`] and the
/// size is clamped to [`MIN_SIZE`]..=[`MAX_SIZE`]. The source pad always
/// follows the `sink` format; the only change allowed is selecting the
/// uncompressed counterpart of a DPCM sink code, which enables decompression.
pub fn try_format(pad: Pad, format: &mut PadFormat, sink: &PadFormat) {
    match pad {
        Pad::Sink => {
            if !SINK_CODES.contains(&format.code) {
                format.code = DEFAULT_CODE;
            }
            format.width = format.width.clamp(MIN_SIZE, MAX_SIZE);
            format.height = format.height.clamp(MIN_SIZE, MAX_SIZE);
        }
        Pad::Source => {
            let requested = format.code;
            *format = *sink;
            if sink.code.uncompressed() == requested {
                format.code = requested;
            }
        }
    }
    format.colorspace = Colorspace::Srgb;
    format.field = Field::None;
}

/// Enumerates the codes supported by a pad.
///
/// Returns `None` when `index` is past the end of the enumeration.
pub fn enum_mbus_code(pad: Pad, index: usize, sink: &PadFormat) -> Option<MbusCode> {
    match pad {
        Pad::Sink => SINK_CODES.get(index).copied(),
        Pad::Source => match index {
            0 => Some(sink.code),
            1 if sink.code.uncompressed() != sink.code => Some(sink.code.uncompressed()),
            _ => None,
        },
    }
}

/// Gives the range of frame sizes supported by a pad for a code.
///
/// Returns `None` if the pad does not support the code.
pub fn enum_frame_size(pad: Pad, code: MbusCode, sink: &PadFormat) -> Option<FrameSizeRange> {
    let mut format = PadFormat {
        code,
        width: MIN_SIZE,
        height: MIN_SIZE,
        ..Default::default()
    };
    try_format(pad, &mut format, sink);
    if format.code != code {
        return None;
    }
    let (min_width, min_height) = (format.width, format.height);
    let mut format = PadFormat {
        code,
        width: u32::MAX,
        height: u32::MAX,
        ..Default::default()
    };
    try_format(pad, &mut format, sink);
    Some(FrameSizeRange {
        min_width,
        max_width: format.width,
        min_height,
        max_height: format.height,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    const REVISIONS: [Revision; 2] = [Revision::Legacy, Revision::Revised];

    #[test]
    fn map_raw10() {
        for revision in REVISIONS {
            for code in [
                MbusCode::SGRBG10_1X10,
                MbusCode::SRGGB10_1X10,
                MbusCode::SBGGR10_1X10,
                MbusCode::SGBRG10_1X10,
            ] {
                assert_eq!(
                    map_format(code, false, Output::MEMORY, revision),
                    Ok(PhysFormat::RAW10_EXP16)
                );
                assert_eq!(
                    map_format(code, false, Output::all(), revision),
                    Ok(PhysFormat::RAW10_EXP16_VP)
                );
                // RAW10 cannot be decompressed
                assert_eq!(
                    map_format(code, true, Output::MEMORY, revision),
                    Err(Error::UnsupportedFormat(code))
                );
                assert_eq!(
                    map_format(code, true, Output::all(), revision),
                    Err(Error::UnsupportedFormat(code))
                );
            }
        }
    }

    #[test]
    fn map_dpcm8() {
        let code = MbusCode::SBGGR10_DPCM8_1X8;
        let table = [
            (false, Output::MEMORY, Revision::Legacy, PhysFormat::RAW8),
            (
                false,
                Output::MEMORY,
                Revision::Revised,
                PhysFormat::USERDEF_8BIT_DATA1,
            ),
            (
                true,
                Output::MEMORY,
                Revision::Legacy,
                PhysFormat::RAW8_DPCM10_EXP16,
            ),
            (
                true,
                Output::MEMORY,
                Revision::Revised,
                PhysFormat::USERDEF_8BIT_DATA1_DPCM10,
            ),
            (false, Output::all(), Revision::Legacy, PhysFormat::RAW8_VP),
            (false, Output::all(), Revision::Revised, PhysFormat::RAW8_VP),
            (
                true,
                Output::all(),
                Revision::Legacy,
                PhysFormat::RAW8_DPCM10_VP,
            ),
            (
                true,
                Output::all(),
                Revision::Revised,
                PhysFormat::USERDEF_8BIT_DATA1_DPCM10_VP,
            ),
        ];
        for (decompress, output, revision, expected) in table {
            assert_eq!(
                map_format(code, decompress, output, revision),
                Ok(expected),
                "decompress {decompress} output {output:?} revision {revision}"
            );
        }
    }

    #[test]
    fn map_cascade_only_uses_video_port_row() {
        assert_eq!(
            map_format(
                MbusCode::SGRBG10_1X10,
                false,
                Output::CASCADE,
                Revision::Legacy
            ),
            Ok(PhysFormat::RAW10_EXP16_VP)
        );
    }

    #[test]
    fn map_unrouted() {
        for revision in REVISIONS {
            for code in SINK_CODES {
                for decompress in [false, true] {
                    assert_eq!(
                        map_format(code, decompress, Output::empty(), revision),
                        Ok(PhysFormat::OTHERS)
                    );
                }
            }
        }
    }

    #[test]
    fn map_unsupported_code() {
        let code = MbusCode(0x2006); // UYVY8_1X16
        for output in [Output::empty(), Output::MEMORY, Output::all()] {
            assert_eq!(
                map_format(code, false, output, Revision::Legacy),
                Err(Error::UnsupportedFormat(code))
            );
        }
    }

    #[test]
    fn user_defined_mapping() {
        assert!(PhysFormat::USERDEF_8BIT_DATA1.is_user_defined());
        assert!(PhysFormat::USERDEF_8BIT_DATA1_DPCM10.is_user_defined());
        assert!(PhysFormat::USERDEF_8BIT_DATA1_DPCM10_VP.is_user_defined());
        assert!(!PhysFormat::RAW8.is_user_defined());
        assert!(!PhysFormat::RAW10_EXP16.is_user_defined());
        assert!(!PhysFormat::RAW8_DPCM10_EXP16.is_user_defined());
        assert!(!PhysFormat::RAW10_EXP16_VP.is_user_defined());
    }

    #[test]
    fn sink_clamp() {
        let sink = PadFormat::default();
        let mut format = PadFormat {
            code: MbusCode::SRGGB10_1X10,
            width: 0,
            height: 10000,
            ..Default::default()
        };
        try_format(Pad::Sink, &mut format, &sink);
        assert_eq!(format.width, 1);
        assert_eq!(format.height, 8191);
        assert_eq!(format.code, MbusCode::SRGGB10_1X10);
        assert_eq!(format.colorspace, Colorspace::Srgb);
        assert_eq!(format.field, Field::None);
    }

    #[test]
    fn sink_default_code() {
        let sink = PadFormat::default();
        let mut format = PadFormat {
            code: MbusCode(0x1234),
            width: 640,
            height: 480,
            ..Default::default()
        };
        try_format(Pad::Sink, &mut format, &sink);
        assert_eq!(format.code, DEFAULT_CODE);
        assert_eq!((format.width, format.height), (640, 480));
    }

    #[test]
    fn source_follows_sink() {
        let sink = PadFormat {
            code: MbusCode::SGBRG10_DPCM8_1X8,
            width: 2592,
            height: 1944,
            colorspace: Colorspace::Srgb,
            field: Field::None,
        };
        // decompression
        let mut format = PadFormat {
            code: MbusCode::SGBRG10_1X10,
            width: 16,
            height: 16,
            ..Default::default()
        };
        try_format(Pad::Source, &mut format, &sink);
        assert_eq!(format.code, MbusCode::SGBRG10_1X10);
        assert_eq!((format.width, format.height), (2592, 1944));
        // pass-through
        let mut format = PadFormat {
            code: MbusCode::SGBRG10_DPCM8_1X8,
            ..Default::default()
        };
        try_format(Pad::Source, &mut format, &sink);
        assert_eq!(format.code, MbusCode::SGBRG10_DPCM8_1X8);
        // any other conversion falls back to the sink code
        let mut format = PadFormat {
            code: MbusCode::SRGGB10_1X10,
            ..Default::default()
        };
        try_format(Pad::Source, &mut format, &sink);
        assert_eq!(format.code, MbusCode::SGBRG10_DPCM8_1X8);
    }

    #[test]
    fn enumerate_sink_codes() {
        let sink = PadFormat::default();
        let codes: Vec<_> = (0..)
            .map_while(|n| enum_mbus_code(Pad::Sink, n, &sink))
            .collect();
        assert_eq!(codes, SINK_CODES);
    }

    #[test]
    fn enumerate_source_codes() {
        let mut sink = PadFormat {
            code: MbusCode::SRGGB10_DPCM8_1X8,
            ..Default::default()
        };
        assert_eq!(
            enum_mbus_code(Pad::Source, 0, &sink),
            Some(MbusCode::SRGGB10_DPCM8_1X8)
        );
        assert_eq!(
            enum_mbus_code(Pad::Source, 1, &sink),
            Some(MbusCode::SRGGB10_1X10)
        );
        assert_eq!(enum_mbus_code(Pad::Source, 2, &sink), None);

        sink.code = MbusCode::SRGGB10_1X10;
        assert_eq!(
            enum_mbus_code(Pad::Source, 0, &sink),
            Some(MbusCode::SRGGB10_1X10)
        );
        assert_eq!(enum_mbus_code(Pad::Source, 1, &sink), None);
    }

    #[test]
    fn frame_size() {
        let sink = PadFormat::default();
        assert_eq!(
            enum_frame_size(Pad::Sink, MbusCode::SBGGR10_1X10, &sink),
            Some(FrameSizeRange {
                min_width: 1,
                max_width: 8191,
                min_height: 1,
                max_height: 8191,
            })
        );
        assert_eq!(enum_frame_size(Pad::Sink, MbusCode(0x2006), &sink), None);
    }

    #[test]
    fn pixel_code_conversion() {
        for code in SINK_CODES {
            let pixel_code = PixelCode::try_from(code).unwrap();
            assert_eq!(MbusCode::from(pixel_code), code);
        }
        assert_eq!(format!("{}", MbusCode::SGRBG10_1X10), "SGRBG10_1X10");
        assert_eq!(format!("{}", MbusCode(0x2006)), "0x2006");
    }

    #[test]
    fn revision_register() {
        assert_eq!(Revision::from_register(0xf0), Revision::Revised);
        assert_eq!(Revision::from_register(0x20), Revision::Legacy);
    }
}
