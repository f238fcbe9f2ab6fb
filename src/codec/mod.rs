//! Per-codec format translation.
//!
//! Every hardware codec differs from the others only in how a negotiated
//! stream description is written into the component. That difference is
//! captured by [`FormatTranslator`]:
//!
//! ```text
//!   caps ──► is_format_change? ──► apply_format ──► port definition + parameters
//!                                     │
//!                                     └─ on failure: previous port definition restored
//! ```
//!
//! | Kind | Element | Role | Extras |
//! |------|---------|------|--------|
//! | [`CodecKind::AacDec`] | `omxaacdec` | `audio_decoder.aac` | down-mix, AAC+ frame size, 1-6 ch layout |
//! | [`CodecKind::H264Dec`] | `omxh264dec` | `video_decoder.avc` | profile/level, second decode core |
//! | [`CodecKind::Vp8Enc`] | `omxvp8enc` | `video_encoder.vp8` | intra interval, sharpness, DCT partitions |
//! | [`CodecKind::Vp9Dec`] | `omxvp9dec` | `video_decoder.vp9` | dynamic resolution |
//! | [`CodecKind::WmaDec`] | `omxwmadec` | `audio_decoder.wma` | `codec_data` options, output unit |
//! | [`CodecKind::WmvDec`] | `omxwmvdec` | `video_decoder.wmv` | sequence header synthesis |
//!
//! The translator is chosen once, at construction, through [`CodecTranslator::new`].
//!
//! # Example
//!
//! ```rust,ignore
//! use omxbridge::codec::{CodecKind, CodecTranslator, FormatContext, FormatTranslator, VendorExtensions};
//!
//! let translator = CodecTranslator::new(CodecKind::AacDec, VendorExtensions::all());
//! let ctx = FormatContext::new(&component, &*in_port, &*out_port);
//! if translator.is_format_change(&ctx, &caps)? {
//!     // drain, disable ports...
//! }
//! translator.apply_format(&ctx, &caps)?;
//! ```

mod aac;
mod h264;
mod vp8;
mod vp9;
mod wma;
mod wmv;

pub use aac::{AacDecoder, AacDecoderSettings};
pub use h264::{H264Decoder, H264DecoderSettings, avc_level_from_str, avc_profile_from_str};
pub use vp8::{Vp8Encoder, Vp8EncoderSettings};
pub use vp9::Vp9Decoder;
pub use wma::WmaDecoder;
pub use wmv::{SEQUENCE_HEADER_SIZE, WmvDecoder, sequence_header};

use crate::caps::Caps;
use crate::error::{Error, Result};
use crate::observability::span_format;
use crate::omx::{Component, HardwareBuffer, HardwarePort, PortDefinition};
use smallvec::SmallVec;
use std::fmt;

// ============================================================================
// Context
// ============================================================================

/// What a translator may touch while negotiating a format.
#[derive(Clone, Copy)]
pub struct FormatContext<'a> {
    /// The hardware component.
    pub component: &'a dyn Component,
    /// Input port.
    pub input: &'a dyn HardwarePort,
    /// Output port.
    pub output: &'a dyn HardwarePort,
    /// Caps currently negotiated on the input side, if any.
    pub current_caps: Option<&'a Caps>,
    /// Caps accepted by the downstream peer, if queried.
    pub peer_caps: Option<&'a Caps>,
}

impl<'a> FormatContext<'a> {
    /// Context without negotiated or peer caps.
    pub fn new(
        component: &'a dyn Component,
        input: &'a dyn HardwarePort,
        output: &'a dyn HardwarePort,
    ) -> Self {
        Self {
            component,
            input,
            output,
            current_caps: None,
            peer_caps: None,
        }
    }

    /// Set the currently negotiated caps.
    pub fn with_current_caps(mut self, caps: &'a Caps) -> Self {
        self.current_caps = Some(caps);
        self
    }

    /// Set the downstream peer caps.
    pub fn with_peer_caps(mut self, caps: &'a Caps) -> Self {
        self.peer_caps = Some(caps);
        self
    }
}

impl fmt::Debug for FormatContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatContext")
            .field("component", &self.component.name())
            .field("input", &self.input.index())
            .field("output", &self.output.index())
            .field("current_caps", &self.current_caps)
            .field("peer_caps", &self.peer_caps)
            .finish()
    }
}

// ============================================================================
// Translator contract
// ============================================================================

/// Writes a stream description into a hardware component.
pub trait FormatTranslator: Send + Sync {
    /// Codec handled by this translator.
    fn kind(&self) -> CodecKind;

    /// Whether `caps` differs from what the component is configured for in a
    /// way that needs the ports reconfigured.
    fn is_format_change(&self, ctx: &FormatContext<'_>, caps: &Caps) -> Result<bool>;

    /// Configure the component for `caps`.
    ///
    /// Caps are validated before anything is written. If a parameter write
    /// fails after the port definition was updated, the previous definition
    /// is restored before the error is returned.
    fn apply_format(&self, ctx: &FormatContext<'_>, caps: &Caps) -> Result<()>;

    /// Samples per decoded audio frame, if the codec has a fixed one.
    fn samples_per_frame(&self, _ctx: &FormatContext<'_>) -> Option<u32> {
        None
    }

    /// Channel layout of decoded audio, `None` if the channel count has no
    /// known layout.
    fn channel_positions(&self, _ctx: &FormatContext<'_>) -> Result<Option<ChannelLayout>> {
        Ok(None)
    }

    /// Caps of the encoded output, for encoders that report them.
    fn output_caps(&self, _ctx: &FormatContext<'_>) -> Result<Option<Caps>> {
        Ok(None)
    }

    /// Picture size after a resolution change signalled on `buffer`.
    fn dynamic_resolution(&self, _buffer: &HardwareBuffer, current: (u32, u32)) -> (u32, u32) {
        current
    }

    /// Replacement for the stream's `codec_data` before the first frame is
    /// queued, if the component needs a different header.
    fn prepare_codec_data(
        &self,
        _ctx: &FormatContext<'_>,
        _codec_data: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Speaker position of one audio channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelPosition {
    /// Single channel.
    Mono,
    /// Front left.
    FrontLeft,
    /// Front right.
    FrontRight,
    /// Front center.
    FrontCenter,
    /// Rear center.
    RearCenter,
    /// Rear left.
    RearLeft,
    /// Rear right.
    RearRight,
    /// Low-frequency effects.
    Lfe1,
}

/// Positions of all channels, in interleaving order.
pub type ChannelLayout = SmallVec<[ChannelPosition; 8]>;

// ============================================================================
// Codec kinds
// ============================================================================

/// Static description of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementMetadata {
    /// Human-readable name.
    pub long_name: &'static str,
    /// Element classification.
    pub classification: &'static str,
    /// One-line description.
    pub description: &'static str,
}

/// Supported codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    /// AAC audio decoder.
    AacDec,
    /// H.264 video decoder.
    H264Dec,
    /// VP8 video encoder.
    Vp8Enc,
    /// VP9 video decoder.
    Vp9Dec,
    /// WMA audio decoder.
    WmaDec,
    /// WMV video decoder.
    WmvDec,
}

impl CodecKind {
    /// All kinds.
    pub const ALL: [CodecKind; 6] = [
        CodecKind::AacDec,
        CodecKind::H264Dec,
        CodecKind::Vp8Enc,
        CodecKind::Vp9Dec,
        CodecKind::WmaDec,
        CodecKind::WmvDec,
    ];

    /// Element name.
    pub fn element_name(&self) -> &'static str {
        match self {
            Self::AacDec => "omxaacdec",
            Self::H264Dec => "omxh264dec",
            Self::Vp8Enc => "omxvp8enc",
            Self::Vp9Dec => "omxvp9dec",
            Self::WmaDec => "omxwmadec",
            Self::WmvDec => "omxwmvdec",
        }
    }

    /// Standard component role.
    pub fn role(&self) -> &'static str {
        match self {
            Self::AacDec => "audio_decoder.aac",
            Self::H264Dec => "video_decoder.avc",
            Self::Vp8Enc => "video_encoder.vp8",
            Self::Vp9Dec => "video_decoder.vp9",
            Self::WmaDec => "audio_decoder.wma",
            Self::WmvDec => "video_decoder.wmv",
        }
    }

    /// Template caps of the compressed side.
    pub fn template_caps(&self) -> &'static str {
        match self {
            Self::AacDec => {
                "audio/mpeg, mpegversion=(int){2, 4}, \
                 stream-format=(string) { raw, adts, adif, loas }, \
                 rate=(int)[8000,48000], channels=(int)[1,9], framed=(boolean) true"
            }
            Self::H264Dec => {
                "video/x-h264, alignment=(string) au, stream-format=(string) byte-stream, \
                 width=(int) [1,MAX], height=(int) [1,MAX]"
            }
            Self::Vp8Enc => "video/x-vp8, width=(int) [ 80, 1920 ], height=(int) [ 80, 1080 ]",
            Self::Vp9Dec => "video/x-vp9, width=(int) [1,MAX], height=(int) [1,MAX]",
            Self::WmaDec => {
                "audio/x-wma, wmaversion=(int)[1,3], rate=(int)[8000,48000], \
                 channels=(int)[1,2], block_align=(int)[0, 2147483647], \
                 bitrate=(int)[0, 2147483647]"
            }
            Self::WmvDec => "video/x-wmv, width=(int) [1,MAX], height=(int) [1,MAX]",
        }
    }

    /// Element metadata.
    pub fn metadata(&self) -> ElementMetadata {
        let (long_name, classification, description) = match self {
            Self::AacDec => (
                "OpenMAX AAC Audio Decoder",
                "Codec/Decoder/Audio/Hardware",
                "Decode AAC audio streams",
            ),
            Self::H264Dec => (
                "OpenMAX H.264 Video Decoder",
                "Codec/Decoder/Video/Hardware",
                "Decode H.264 video streams",
            ),
            Self::Vp8Enc => (
                "OpenMAX VP8 Video Encoder",
                "Codec/Encoder/Video",
                "Encode VP8 video streams",
            ),
            Self::Vp9Dec => (
                "OpenMAX VP9 Video Decoder",
                "Codec/Decoder/Video",
                "Decode VP9 video streams",
            ),
            Self::WmaDec => (
                "OpenMAX WMA Audio Decoder",
                "Codec/Decoder/Audio",
                "Decode WMA audio streams",
            ),
            Self::WmvDec => (
                "OpenMAX WMV Video Decoder",
                "Codec/Decoder/Video/Hardware",
                "Decode WMV video streams",
            ),
        };
        ElementMetadata {
            long_name,
            classification,
            description,
        }
    }

    /// True for encoders.
    pub fn is_encoder(&self) -> bool {
        matches!(self, Self::Vp8Enc)
    }

    /// Look up a kind by element name.
    pub fn from_element_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.element_name() == name)
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_name())
    }
}

// ============================================================================
// Vendor extensions
// ============================================================================

/// Vendor parameter extensions the component supports.
///
/// A translator skips (with a warning) any extension that is not available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorExtensions {
    /// AAC down-mix switch.
    pub aac_downmix: bool,
    /// H.264 decode core selection.
    pub avc_second_hwip: bool,
    /// VP8 intra interval and sharpness.
    pub vp8_misc: bool,
    /// Native VP9 compression format.
    pub vp9_coding: bool,
    /// Per-buffer decode result on video output.
    pub decode_result: bool,
    /// Audio output unit selection.
    pub audio_output_unit: bool,
    /// WMV simple/main profile sequence header.
    pub wmv_sequence_header: bool,
}

impl VendorExtensions {
    /// Every extension available.
    pub const fn all() -> Self {
        Self {
            aac_downmix: true,
            avc_second_hwip: true,
            vp8_misc: true,
            vp9_coding: true,
            decode_result: true,
            audio_output_unit: true,
            wmv_sequence_header: true,
        }
    }

    /// Standard parameters only.
    pub const fn none() -> Self {
        Self {
            aac_downmix: false,
            avc_second_hwip: false,
            vp8_misc: false,
            vp9_coding: false,
            decode_result: false,
            audio_output_unit: false,
            wmv_sequence_header: false,
        }
    }
}

impl Default for VendorExtensions {
    fn default() -> Self {
        Self::all()
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Translator selected by codec kind.
#[derive(Debug)]
pub enum CodecTranslator {
    /// AAC decoder.
    Aac(AacDecoder),
    /// H.264 decoder.
    H264(H264Decoder),
    /// VP8 encoder.
    Vp8(Vp8Encoder),
    /// VP9 decoder.
    Vp9(Vp9Decoder),
    /// WMA decoder.
    Wma(WmaDecoder),
    /// WMV decoder.
    Wmv(WmvDecoder),
}

impl CodecTranslator {
    /// Translator for `kind` with default settings.
    pub fn new(kind: CodecKind, vendor: VendorExtensions) -> Self {
        match kind {
            CodecKind::AacDec => Self::Aac(AacDecoder::new(AacDecoderSettings::default(), vendor)),
            CodecKind::H264Dec => {
                Self::H264(H264Decoder::new(H264DecoderSettings::default(), vendor))
            }
            CodecKind::Vp8Enc => Self::Vp8(Vp8Encoder::new(Vp8EncoderSettings::default(), vendor)),
            CodecKind::Vp9Dec => Self::Vp9(Vp9Decoder::new(vendor)),
            CodecKind::WmaDec => Self::Wma(WmaDecoder::new(vendor)),
            CodecKind::WmvDec => Self::Wmv(WmvDecoder::new(vendor)),
        }
    }

    fn inner(&self) -> &dyn FormatTranslator {
        match self {
            Self::Aac(t) => t,
            Self::H264(t) => t,
            Self::Vp8(t) => t,
            Self::Vp9(t) => t,
            Self::Wma(t) => t,
            Self::Wmv(t) => t,
        }
    }
}

impl FormatTranslator for CodecTranslator {
    fn kind(&self) -> CodecKind {
        self.inner().kind()
    }

    fn is_format_change(&self, ctx: &FormatContext<'_>, caps: &Caps) -> Result<bool> {
        self.inner().is_format_change(ctx, caps)
    }

    fn apply_format(&self, ctx: &FormatContext<'_>, caps: &Caps) -> Result<()> {
        let _span = span_format(ctx.component.name(), self.kind().element_name()).entered();
        self.inner().apply_format(ctx, caps).inspect_err(|err| {
            tracing::error!(error = %err, caps = %caps, "failed to apply format");
        })
    }

    fn samples_per_frame(&self, ctx: &FormatContext<'_>) -> Option<u32> {
        self.inner().samples_per_frame(ctx)
    }

    fn channel_positions(&self, ctx: &FormatContext<'_>) -> Result<Option<ChannelLayout>> {
        self.inner().channel_positions(ctx)
    }

    fn output_caps(&self, ctx: &FormatContext<'_>) -> Result<Option<Caps>> {
        self.inner().output_caps(ctx)
    }

    fn dynamic_resolution(&self, buffer: &HardwareBuffer, current: (u32, u32)) -> (u32, u32) {
        self.inner().dynamic_resolution(buffer, current)
    }

    fn prepare_codec_data(
        &self,
        ctx: &FormatContext<'_>,
        codec_data: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        self.inner().prepare_codec_data(ctx, codec_data)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Integer caps field that must be present and fit in a `u32`.
pub(crate) fn required_u32(caps: &Caps, key: &'static str) -> Result<u32> {
    let value = caps.get_int(key).ok_or(Error::IncompleteCaps(key))?;
    u32::try_from(value).map_err(|_| Error::unsupported(key, value))
}

/// Update a port definition with `edit`, then run `rest`.
///
/// The previous definition is written back if `rest` fails.
pub(crate) fn with_port_update<T>(
    port: &dyn HardwarePort,
    edit: impl FnOnce(&mut PortDefinition),
    rest: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let previous = port.definition();
    let mut definition = previous;
    edit(&mut definition);
    port.update_definition(&definition)?;

    rest().inspect_err(|_| {
        if let Err(restore) = port.update_definition(&previous) {
            tracing::warn!(
                port = port.index(),
                error = %restore,
                "failed to restore port definition"
            );
        }
    })
}
