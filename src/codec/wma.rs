//! WMA audio decoder.

use super::aac::pcm_param;
use super::{
    ChannelLayout, ChannelPosition, CodecKind, FormatContext, FormatTranslator, VendorExtensions,
    required_u32, with_port_update,
};
use crate::caps::Caps;
use crate::error::{Error, Result};
use crate::omx::{AudioCoding, OutputUnit, OutputUnitParam, Param, WmaParam};
use smallvec::smallvec;

/// Codec-private data needed to carry encoder options.
const MIN_CODEC_DATA: usize = 10;

/// Stream parameters parsed from `audio/x-wma` caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WmaCaps {
    rate: u32,
    channels: u32,
    block_align: u32,
    bitrate: u32,
    /// Encode options and super block alignment from `codec_data`.
    options: Option<(u16, u32)>,
}

impl WmaCaps {
    fn parse(caps: &Caps) -> Result<Self> {
        required_u32(caps, "wmaversion")?;
        Ok(Self {
            rate: required_u32(caps, "rate")?,
            channels: required_u32(caps, "channels")?,
            block_align: required_u32(caps, "block_align")?,
            bitrate: required_u32(caps, "bitrate")?,
            options: caps.get_buffer("codec_data").and_then(codec_data_options),
        })
    }
}

/// Encode options (LE u16 at byte 4) and super block alignment (LE u32 at byte 6).
fn codec_data_options(data: &[u8]) -> Option<(u16, u32)> {
    if data.len() < MIN_CODEC_DATA {
        return None;
    }
    let options = u16::from_le_bytes([data[4], data[5]]);
    let super_block_align = u32::from_le_bytes([data[6], data[7], data[8], data[9]]);
    Some((options, super_block_align))
}

/// WMA decoder translator.
#[derive(Debug)]
pub struct WmaDecoder {
    vendor: VendorExtensions,
}

impl WmaDecoder {
    /// Create a translator.
    pub fn new(vendor: VendorExtensions) -> Self {
        Self { vendor }
    }

    fn wma_param(ctx: &FormatContext<'_>) -> Result<WmaParam> {
        let mut param = Param::Wma(WmaParam {
            port_index: ctx.input.index(),
            ..Default::default()
        });
        ctx.component.get_parameter(&mut param)?;
        match param {
            Param::Wma(wma) => Ok(wma),
            other => Err(Error::Invariant(format!("expected WMA parameter, got {other:?}"))),
        }
    }
}

impl FormatTranslator for WmaDecoder {
    fn kind(&self) -> CodecKind {
        CodecKind::WmaDec
    }

    fn is_format_change(&self, ctx: &FormatContext<'_>, caps: &Caps) -> Result<bool> {
        let current = Self::wma_param(ctx)?;
        let stream = WmaCaps::parse(caps)?;

        Ok(current.channels != stream.channels
            || current.bit_rate != stream.bitrate
            || current.sampling_rate != stream.rate
            || current.block_align != stream.block_align)
    }

    fn apply_format(&self, ctx: &FormatContext<'_>, caps: &Caps) -> Result<()> {
        let stream = WmaCaps::parse(caps)?;

        with_port_update(
            ctx.input,
            |def| {
                if let Some(audio) = def.audio_format_mut() {
                    audio.encoding = AudioCoding::Wma;
                }
            },
            || {
                let mut param = Self::wma_param(ctx)?;
                param.channels = stream.channels;
                param.bit_rate = stream.bitrate;
                param.sampling_rate = stream.rate;
                param.block_align = stream.block_align;
                if let Some((options, super_block_align)) = stream.options {
                    param.encode_options = options;
                    param.super_block_align = super_block_align;
                }
                ctx.component.set_parameter(&Param::Wma(param))?;

                if self.vendor.audio_output_unit {
                    ctx.component.set_parameter(&Param::AudioOutputUnit(OutputUnitParam {
                        port_index: ctx.output.index(),
                        unit: OutputUnit::Payload,
                    }))?;
                }
                Ok(())
            },
        )
    }

    fn channel_positions(&self, ctx: &FormatContext<'_>) -> Result<Option<ChannelLayout>> {
        let layout: ChannelLayout = match pcm_param(ctx)?.channels {
            1 => smallvec![ChannelPosition::Mono],
            2 => smallvec![ChannelPosition::FrontLeft, ChannelPosition::FrontRight],
            _ => return Ok(None),
        };
        Ok(Some(layout))
    }
}
