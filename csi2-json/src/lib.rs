//! csi2-json contains the JSON schemas used by the csi2-httpd HTTP API.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};

/// API JSON schema.
///
/// This JSON schema corresponds to GET requests on `/api`. It contains the
/// full state of the CSI-2 receiver.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Api {
    /// Receiver identification.
    pub receiver: Receiver,
    /// Sink pad format.
    pub sink: PadFormat,
    /// Source pad format.
    pub source: PadFormat,
    /// Output links.
    pub links: Links,
    /// Streaming state.
    pub stream: Stream,
    /// Frame and error counters.
    pub stats: Stats,
}

/// Receiver JSON schema.
///
/// Read-only identification of the receiver instance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Receiver {
    /// Receiver instance name.
    pub instance: String,
    /// ISP hardware revision.
    pub revision: String,
    /// Whether the receiver is present in this ISP revision.
    pub available: bool,
}

/// Media bus pixel codes accepted by the receiver.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PixelCode {
    /// Bayer GRBG, 10 bits per sample.
    #[serde(rename = "SGRBG10_1X10")]
    Sgrbg10,
    /// Bayer GRBG, 10 bits DPCM-compressed to 8 bits.
    #[serde(rename = "SGRBG10_DPCM8_1X8")]
    Sgrbg10Dpcm8,
    /// Bayer RGGB, 10 bits per sample.
    #[serde(rename = "SRGGB10_1X10")]
    Srggb10,
    /// Bayer RGGB, 10 bits DPCM-compressed to 8 bits.
    #[serde(rename = "SRGGB10_DPCM8_1X8")]
    Srggb10Dpcm8,
    /// Bayer BGGR, 10 bits per sample.
    #[serde(rename = "SBGGR10_1X10")]
    Sbggr10,
    /// Bayer BGGR, 10 bits DPCM-compressed to 8 bits.
    #[serde(rename = "SBGGR10_DPCM8_1X8")]
    Sbggr10Dpcm8,
    /// Bayer GBRG, 10 bits per sample.
    #[serde(rename = "SGBRG10_1X10")]
    Sgbrg10,
    /// Bayer GBRG, 10 bits DPCM-compressed to 8 bits.
    #[serde(rename = "SGBRG10_DPCM8_1X8")]
    Sgbrg10Dpcm8,
}

/// Colorspace of a pad format.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Colorspace {
    /// Colorspace not specified.
    #[default]
    Default,
    /// sRGB.
    Srgb,
}

/// Field order of a pad format.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Field {
    /// Any field order.
    #[default]
    Any,
    /// Progressive (no fields).
    None,
}

macro_rules! impl_str_conv {
    ($ty:ty, $($s:expr => $v:ident),*) => {
        impl std::str::FromStr for $ty {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, ()> {
                Ok(match s {
                    $(
                        $s => <$ty>::$v,
                    )*
                        _ => return Err(()),
                })
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
                write!(f, "{}", match self {
                    $(
                        <$ty>::$v => $s,
                    )*
                })
            }
        }
    }
}

impl_str_conv!(PixelCode,
               "SGRBG10_1X10" => Sgrbg10,
               "SGRBG10_DPCM8_1X8" => Sgrbg10Dpcm8,
               "SRGGB10_1X10" => Srggb10,
               "SRGGB10_DPCM8_1X8" => Srggb10Dpcm8,
               "SBGGR10_1X10" => Sbggr10,
               "SBGGR10_DPCM8_1X8" => Sbggr10Dpcm8,
               "SGBRG10_1X10" => Sgbrg10,
               "SGBRG10_DPCM8_1X8" => Sgbrg10Dpcm8);

/// Pad format JSON schema.
///
/// This JSON schema corresponds to GET requests on `/api/format/sink` and
/// `/api/format/source`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PadFormat {
    /// Media bus pixel code.
    pub code: PixelCode,
    /// Width in pixels.
    pub width: u32,
    /// Height in lines.
    pub height: u32,
    /// Colorspace.
    pub colorspace: Colorspace,
    /// Field order.
    pub field: Field,
}

/// Pad format PUT JSON schema.
///
/// This JSON schema corresponds to PUT requests on `/api/format/sink` and
/// `/api/format/source`. The pixel code is given by name. Unknown names are
/// not an error: the receiver replaces them by its default code.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PutPadFormat {
    /// Media bus pixel code name.
    pub code: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in lines.
    pub height: u32,
}

/// Pad code enumeration JSON schema.
///
/// This JSON schema corresponds to GET requests on `/api/format/sink/codes`
/// and `/api/format/source/codes`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PadCodes {
    /// Pixel codes supported by the pad, in enumeration order.
    pub codes: Vec<PadCode>,
}

/// Pixel code supported by a pad together with its frame size range.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PadCode {
    /// Media bus pixel code.
    pub code: PixelCode,
    /// Minimum width in pixels.
    pub min_width: u32,
    /// Maximum width in pixels.
    pub max_width: u32,
    /// Minimum height in lines.
    pub min_height: u32,
    /// Maximum height in lines.
    pub max_height: u32,
}

/// Receiver streaming state.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StreamState {
    /// Interface and context disabled.
    Idle,
    /// Interface enabled and capturing.
    Streaming,
    /// Streaming requested but waiting for an output buffer.
    Underrun,
}

impl_str_conv!(StreamState,
               "Idle" => Idle,
               "Streaming" => Streaming,
               "Underrun" => Underrun);

/// Stream JSON schema.
///
/// This JSON schema corresponds to GET requests on `/api/stream`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Stream {
    /// Current streaming state.
    pub state: StreamState,
}

/// Stream PUT JSON schema.
///
/// This JSON schema corresponds to PUT requests on `/api/stream`. It starts
/// or stops streaming.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PutStream {
    /// Whether the receiver should be streaming.
    pub streaming: bool,
}

/// Links JSON schema.
///
/// This JSON schema corresponds to GET and PUT requests on `/api/links`. It
/// contains the activation state of the receiver output links.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Links {
    /// Output link to the memory capture node.
    pub memory: bool,
    /// Output link to the downstream processing stage.
    pub cascade: bool,
}

/// Links PATCH JSON schema.
///
/// This JSON schema corresponds to PATCH requests on `/api/links`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PatchLinks {
    /// Output link to the memory capture node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<bool>,
    /// Output link to the downstream processing stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cascade: Option<bool>,
}

impl From<Links> for PatchLinks {
    fn from(val: Links) -> PatchLinks {
        PatchLinks {
            memory: Some(val.memory),
            cascade: Some(val.cascade),
        }
    }
}

/// Receiver statistics JSON schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Stats {
    /// Frames written to memory.
    pub frames: u64,
    /// Frames that ended without a buffer to continue into.
    pub underruns: u64,
    /// Interrupts that reported a transmission error.
    pub transmission_errors: u64,
}

/// Register dump JSON schema.
///
/// This JSON schema corresponds to GET requests on `/api/registers`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegisterDump {
    /// Registers in dump order.
    pub registers: Vec<Register>,
}

/// Value of a single register.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Register {
    /// Register name.
    pub name: String,
    /// Register value.
    pub value: u32,
}
