//! AAC audio decoder.

use super::{
    ChannelLayout, ChannelPosition, CodecKind, FormatContext, FormatTranslator, VendorExtensions,
    required_u32, with_port_update,
};
use crate::caps::Caps;
use crate::error::{Error, Result};
use crate::omx::{AacDownmixParam, AacParam, AacStreamFormat, AudioCoding, Param, PcmParam};
use smallvec::smallvec;
use std::sync::atomic::{AtomicU32, Ordering};

/// Component that honours the down-mix extension.
const DOWNMIX_COMPONENT: &str = "OMX.RENESAS.AUDIO.DECODER.AAC";

const SAMPLES_PER_FRAME: u32 = 1024;
const SAMPLES_PER_FRAME_SBR: u32 = 2048;

/// User-facing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AacDecoderSettings {
    /// Down-mix multichannel streams to stereo.
    pub down_mix: bool,
}

impl Default for AacDecoderSettings {
    fn default() -> Self {
        Self { down_mix: true }
    }
}

/// Stream parameters parsed from `audio/mpeg` caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AacCaps<'a> {
    mpegversion: u32,
    rate: u32,
    channels: u32,
    stream_format: &'a str,
}

impl<'a> AacCaps<'a> {
    fn parse(caps: &'a Caps) -> Result<Self> {
        Ok(Self {
            mpegversion: required_u32(caps, "mpegversion")?,
            rate: required_u32(caps, "rate")?,
            channels: required_u32(caps, "channels")?,
            stream_format: caps
                .get_str("stream-format")
                .ok_or(Error::IncompleteCaps("stream-format"))?,
        })
    }

    fn omx_stream_format(&self) -> Result<AacStreamFormat> {
        if self.mpegversion == 2 {
            return Ok(AacStreamFormat::Mp2Adts);
        }
        match self.stream_format {
            "adts" => Ok(AacStreamFormat::Mp4Adts),
            "loas" => Ok(AacStreamFormat::Mp4Loas),
            "adif" => Ok(AacStreamFormat::Adif),
            "raw" => Ok(AacStreamFormat::Raw),
            other => Err(Error::unsupported("stream-format", other)),
        }
    }

    /// Whether the component's current stream format no longer matches.
    fn stream_format_differs(&self, current: AacStreamFormat) -> bool {
        if self.mpegversion == 2 && current != AacStreamFormat::Mp2Adts {
            return true;
        }
        let expected = match current {
            AacStreamFormat::Mp4Adts => "adts",
            AacStreamFormat::Mp4Loas => "loas",
            AacStreamFormat::Adif => "adif",
            AacStreamFormat::Raw => "raw",
            _ => return false,
        };
        self.stream_format != expected
    }
}

/// AAC decoder translator.
#[derive(Debug)]
pub struct AacDecoder {
    settings: AacDecoderSettings,
    vendor: VendorExtensions,
    spf: AtomicU32,
}

impl AacDecoder {
    /// Create a translator.
    pub fn new(settings: AacDecoderSettings, vendor: VendorExtensions) -> Self {
        Self {
            settings,
            vendor,
            spf: AtomicU32::new(SAMPLES_PER_FRAME),
        }
    }

    /// Current settings.
    pub fn settings(&self) -> AacDecoderSettings {
        self.settings
    }

    fn aac_param(ctx: &FormatContext<'_>) -> Result<AacParam> {
        let mut param = Param::Aac(AacParam {
            port_index: ctx.input.index(),
            ..Default::default()
        });
        ctx.component.get_parameter(&mut param)?;
        match param {
            Param::Aac(aac) => Ok(aac),
            other => Err(Error::Invariant(format!("expected AAC parameter, got {other:?}"))),
        }
    }

    fn set_down_mix(&self, ctx: &FormatContext<'_>) {
        if !self.vendor.aac_downmix {
            tracing::warn!("down-mix is not supported by this component");
            return;
        }
        if ctx.component.name() != DOWNMIX_COMPONENT {
            tracing::warn!(
                component = ctx.component.name(),
                "down-mix is only effective on {DOWNMIX_COMPONENT}"
            );
            return;
        }
        let param = Param::AacDownmix(AacDownmixParam {
            port_index: ctx.output.index(),
            enable: self.settings.down_mix,
        });
        if let Err(err) = ctx.component.set_parameter(&param) {
            tracing::warn!(error = %err, "failed to set down-mix mode");
        }
    }
}

pub(super) fn pcm_param(ctx: &FormatContext<'_>) -> Result<PcmParam> {
    let mut param = Param::Pcm(PcmParam {
        port_index: ctx.output.index(),
        ..Default::default()
    });
    ctx.component.get_parameter(&mut param)?;
    match param {
        Param::Pcm(pcm) => Ok(pcm),
        other => Err(Error::Invariant(format!("expected PCM parameter, got {other:?}"))),
    }
}

impl FormatTranslator for AacDecoder {
    fn kind(&self) -> CodecKind {
        CodecKind::AacDec
    }

    fn is_format_change(&self, ctx: &FormatContext<'_>, caps: &Caps) -> Result<bool> {
        let current = Self::aac_param(ctx)?;
        let stream = AacCaps::parse(caps)?;

        Ok(current.channels != stream.channels
            || current.sample_rate != stream.rate
            || stream.stream_format_differs(current.stream_format))
    }

    fn apply_format(&self, ctx: &FormatContext<'_>, caps: &Caps) -> Result<()> {
        let stream = AacCaps::parse(caps)?;
        let stream_format = stream.omx_stream_format()?;

        with_port_update(
            ctx.input,
            |def| {
                if let Some(audio) = def.audio_format_mut() {
                    audio.encoding = AudioCoding::Aac;
                }
            },
            || {
                let mut param = Self::aac_param(ctx)?;
                param.channels = stream.channels;
                param.sample_rate = stream.rate;
                param.bit_rate = 0;
                param.audio_bandwidth = 0;
                param.stream_format = stream_format;
                ctx.component.set_parameter(&Param::Aac(param))?;
                Ok(())
            },
        )?;

        tracing::debug!(
            channels = stream.channels,
            rate = stream.rate,
            format = ?stream_format,
            "configured AAC input"
        );
        self.set_down_mix(ctx);
        Ok(())
    }

    /// 2048 when the output rate is twice the input rate (SBR), else 1024.
    fn samples_per_frame(&self, ctx: &FormatContext<'_>) -> Option<u32> {
        let detected = Self::aac_param(ctx).and_then(|aac| {
            let pcm = pcm_param(ctx)?;
            Ok(if pcm.sampling_rate == 2 * aac.sample_rate {
                SAMPLES_PER_FRAME_SBR
            } else {
                SAMPLES_PER_FRAME
            })
        });
        match detected {
            Ok(spf) => {
                tracing::debug!(spf, "decoding AAC");
                self.spf.store(spf, Ordering::Relaxed);
            }
            Err(err) => {
                tracing::error!(error = %err, "cannot detect whether the input is AAC+");
            }
        }
        Some(self.spf.load(Ordering::Relaxed))
    }

    fn channel_positions(&self, ctx: &FormatContext<'_>) -> Result<Option<ChannelLayout>> {
        use ChannelPosition::*;

        let layout: ChannelLayout = match pcm_param(ctx)?.channels {
            1 => smallvec![Mono],
            2 => smallvec![FrontLeft, FrontRight],
            3 => smallvec![FrontCenter, FrontLeft, FrontRight],
            4 => smallvec![FrontCenter, FrontLeft, FrontRight, RearCenter],
            5 => smallvec![FrontCenter, FrontLeft, FrontRight, RearLeft, RearRight],
            6 => smallvec![FrontCenter, FrontLeft, FrontRight, RearLeft, RearRight, Lfe1],
            _ => return Ok(None),
        };
        Ok(Some(layout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::omx::sim::{SimBacking, SimComponent, SimPort};
    use crate::omx::{
        Direction, HardwarePort, OmxError, ParamIndex, PortDefinition, PortDomain,
    };

    fn ports() -> (SimPort, SimPort) {
        (
            SimPort::new(
                PortDefinition::audio(0, Direction::Input, AudioCoding::Unused),
                SimBacking::System,
            ),
            SimPort::new(
                PortDefinition::audio(1, Direction::Output, AudioCoding::Pcm),
                SimBacking::System,
            ),
        )
    }

    fn component(name: &str, rate: u32, pcm_rate: u32, pcm_channels: u32) -> SimComponent {
        SimComponent::new(name)
            .with_parameter(Param::Aac(AacParam {
                port_index: 0,
                channels: 2,
                sample_rate: rate,
                stream_format: AacStreamFormat::Mp4Adts,
                ..Default::default()
            }))
            .with_parameter(Param::Pcm(PcmParam {
                port_index: 1,
                channels: pcm_channels,
                sampling_rate: pcm_rate,
            }))
    }

    fn caps(mpegversion: i32, format: &str, rate: i32, channels: i32) -> Caps {
        Caps::builder("audio/mpeg")
            .field("mpegversion", mpegversion)
            .field("stream-format", format)
            .field("rate", rate)
            .field("channels", channels)
            .build()
    }

    #[test]
    fn test_apply_format_writes_parameters() {
        let (input, output) = ports();
        let comp = component(DOWNMIX_COMPONENT, 44100, 44100, 2);
        let dec = AacDecoder::new(AacDecoderSettings { down_mix: false }, VendorExtensions::all());
        let ctx = FormatContext::new(&comp, &input, &output);

        dec.apply_format(&ctx, &caps(4, "loas", 48000, 6)).unwrap();

        assert!(matches!(
            input.definition().domain,
            PortDomain::Audio(a) if a.encoding == AudioCoding::Aac
        ));
        match comp.parameter(ParamIndex::AudioAac, Some(0)) {
            Some(Param::Aac(p)) => {
                assert_eq!(p.channels, 6);
                assert_eq!(p.sample_rate, 48000);
                assert_eq!(p.stream_format, AacStreamFormat::Mp4Loas);
                assert_eq!(p.bit_rate, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            comp.parameter(ParamIndex::AudioAacDownmix, Some(1)),
            Some(Param::AacDownmix(AacDownmixParam {
                port_index: 1,
                enable: false
            }))
        );
    }

    #[test]
    fn test_mpeg2_forces_adts() {
        let (input, output) = ports();
        let comp = component("OMX.RENESAS.AUDIO.DECODER.AACLC", 44100, 44100, 2);
        let dec = AacDecoder::new(AacDecoderSettings::default(), VendorExtensions::all());
        let ctx = FormatContext::new(&comp, &input, &output);

        dec.apply_format(&ctx, &caps(2, "raw", 44100, 2)).unwrap();
        assert!(matches!(
            comp.parameter(ParamIndex::AudioAac, Some(0)),
            Some(Param::Aac(p)) if p.stream_format == AacStreamFormat::Mp2Adts
        ));
        // Down-mix only applies to the full AAC component.
        assert_eq!(comp.parameter(ParamIndex::AudioAacDownmix, Some(1)), None);
    }

    #[test]
    fn test_invalid_caps_write_nothing() {
        let (input, output) = ports();
        let comp = component(DOWNMIX_COMPONENT, 44100, 44100, 2);
        let dec = AacDecoder::new(AacDecoderSettings::default(), VendorExtensions::all());
        let ctx = FormatContext::new(&comp, &input, &output);

        let err = dec.apply_format(&ctx, &caps(4, "latm", 44100, 2)).unwrap_err();
        assert!(matches!(err, Error::Unsupported { kind: "stream-format", .. }));

        let missing = Caps::builder("audio/mpeg").field("mpegversion", 4).build();
        assert!(matches!(
            dec.apply_format(&ctx, &missing),
            Err(Error::IncompleteCaps("rate"))
        ));

        assert!(comp.writes().is_empty());
        assert!(matches!(
            input.definition().domain,
            PortDomain::Audio(a) if a.encoding == AudioCoding::Unused
        ));
    }

    #[test]
    fn test_rejected_parameter_restores_port() {
        let (input, output) = ports();
        let comp = component(DOWNMIX_COMPONENT, 44100, 44100, 2);
        comp.reject_parameter(ParamIndex::AudioAac, Some(OmxError::BadParameter));
        let dec = AacDecoder::new(AacDecoderSettings::default(), VendorExtensions::all());
        let ctx = FormatContext::new(&comp, &input, &output);

        let err = dec.apply_format(&ctx, &caps(4, "adts", 44100, 2)).unwrap_err();
        assert_eq!(err.omx_code(), Some(OmxError::BadParameter.code()));
        assert!(matches!(
            input.definition().domain,
            PortDomain::Audio(a) if a.encoding == AudioCoding::Unused
        ));
    }

    #[test]
    fn test_format_change_detection() {
        let (input, output) = ports();
        let comp = component(DOWNMIX_COMPONENT, 44100, 44100, 2);
        let dec = AacDecoder::new(AacDecoderSettings::default(), VendorExtensions::all());
        let ctx = FormatContext::new(&comp, &input, &output);

        assert!(!dec.is_format_change(&ctx, &caps(4, "adts", 44100, 2)).unwrap());
        assert!(dec.is_format_change(&ctx, &caps(4, "adts", 48000, 2)).unwrap());
        assert!(dec.is_format_change(&ctx, &caps(4, "adts", 44100, 1)).unwrap());
        assert!(dec.is_format_change(&ctx, &caps(4, "raw", 44100, 2)).unwrap());
        assert!(dec.is_format_change(&ctx, &caps(2, "adts", 44100, 2)).unwrap());
    }

    #[test]
    fn test_samples_per_frame_detects_sbr() {
        let (input, output) = ports();
        let dec = AacDecoder::new(AacDecoderSettings::default(), VendorExtensions::all());

        let plain = component(DOWNMIX_COMPONENT, 44100, 44100, 2);
        let ctx = FormatContext::new(&plain, &input, &output);
        assert_eq!(dec.samples_per_frame(&ctx), Some(1024));

        let sbr = component(DOWNMIX_COMPONENT, 24000, 48000, 2);
        let ctx = FormatContext::new(&sbr, &input, &output);
        assert_eq!(dec.samples_per_frame(&ctx), Some(2048));

        // Unreadable parameters keep the last detected value.
        let empty = SimComponent::new(DOWNMIX_COMPONENT);
        let ctx = FormatContext::new(&empty, &input, &output);
        assert_eq!(dec.samples_per_frame(&ctx), Some(2048));
    }

    #[test]
    fn test_channel_positions() {
        let (input, output) = ports();
        let dec = AacDecoder::new(AacDecoderSettings::default(), VendorExtensions::all());

        let six = component(DOWNMIX_COMPONENT, 48000, 48000, 6);
        let ctx = FormatContext::new(&six, &input, &output);
        let layout = dec.channel_positions(&ctx).unwrap().unwrap();
        assert_eq!(layout.len(), 6);
        assert_eq!(layout[0], ChannelPosition::FrontCenter);
        assert_eq!(layout[5], ChannelPosition::Lfe1);

        let eight = component(DOWNMIX_COMPONENT, 48000, 48000, 8);
        let ctx = FormatContext::new(&eight, &input, &output);
        assert_eq!(dec.channel_positions(&ctx).unwrap(), None);
    }
}
