//! H.264 video decoder.

use super::{CodecKind, FormatContext, FormatTranslator, VendorExtensions, with_port_update};
use crate::caps::Caps;
use crate::error::{Error, Result};
use crate::omx::{
    ComponentState, HwipSelectParam, OmxError, Param, ProfileLevelParam, VideoCoding,
};

/// Decode core used when the second core is requested.
const SECOND_IP_CORE: u32 = 1;

/// OMX_VIDEO_AVCPROFILETYPE value for a caps profile string.
pub fn avc_profile_from_str(profile: &str) -> Option<u32> {
    Some(match profile {
        "baseline" | "constrained-baseline" => 0x01,
        "main" => 0x02,
        "extended" => 0x04,
        "high" | "progressive-high" | "constrained-high" => 0x08,
        "high-10" | "high-10-intra" => 0x10,
        "high-4:2:2" | "high-4:2:2-intra" => 0x20,
        "high-4:4:4" | "high-4:4:4-intra" => 0x40,
        _ => return None,
    })
}

/// OMX_VIDEO_AVCLEVELTYPE value for a caps level string.
pub fn avc_level_from_str(level: &str) -> Option<u32> {
    const LEVELS: [&str; 17] = [
        "1", "1b", "1.1", "1.2", "1.3", "2", "2.1", "2.2", "3", "3.1", "3.2", "4", "4.1", "4.2",
        "5", "5.1", "5.2",
    ];
    LEVELS
        .iter()
        .position(|l| *l == level)
        .map(|bit| 1u32 << bit)
}

/// User-facing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct H264DecoderSettings {
    /// Decode on the second hardware core.
    pub use_second_hwip: bool,
    /// Pass the stream's profile and level to the component.
    pub pass_profile_level: bool,
}

/// H.264 decoder translator.
#[derive(Debug)]
pub struct H264Decoder {
    settings: H264DecoderSettings,
    vendor: VendorExtensions,
}

impl H264Decoder {
    /// Create a translator.
    pub fn new(settings: H264DecoderSettings, vendor: VendorExtensions) -> Self {
        Self { settings, vendor }
    }

    /// Current settings.
    pub fn settings(&self) -> H264DecoderSettings {
        self.settings
    }

    fn profile_level(caps: &Caps) -> Result<(u32, u32)> {
        let profile = caps.get_str("profile").ok_or(Error::IncompleteCaps("profile"))?;
        let profile =
            avc_profile_from_str(profile).ok_or_else(|| Error::unsupported("profile", profile))?;
        let level = caps.get_str("level").ok_or(Error::IncompleteCaps("level"))?;
        let level = avc_level_from_str(level).ok_or_else(|| Error::unsupported("level", level))?;
        Ok((profile, level))
    }

    /// Whether the decode core may still be selected.
    fn check_hwip_state(ctx: &FormatContext<'_>) -> Result<()> {
        match ctx.component.state() {
            ComponentState::Loaded | ComponentState::WaitForResources => Ok(()),
            state => {
                tracing::error!(
                    ?state,
                    "decode core can only be selected in Loaded or WaitForResources"
                );
                Err(OmxError::IncorrectStateOperation.into())
            }
        }
    }

    fn set_profile_level(ctx: &FormatContext<'_>, profile: u32, level: u32) -> Result<()> {
        tracing::debug!(profile, level, "setting profile and level on decoder");
        let param = Param::ProfileLevel(ProfileLevelParam {
            port_index: ctx.input.index(),
            profile,
            level,
        });
        match ctx.component.set_parameter(&param) {
            Ok(()) => Ok(()),
            Err(OmxError::UnsupportedIndex) => {
                tracing::warn!("setting profile/level not supported by component");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl FormatTranslator for H264Decoder {
    fn kind(&self) -> CodecKind {
        CodecKind::H264Dec
    }

    /// Compares profile and level against the negotiated caps.
    fn is_format_change(&self, ctx: &FormatContext<'_>, caps: &Caps) -> Result<bool> {
        let Some(current) = ctx.current_caps else {
            return Ok(false);
        };
        Ok(current.get_str("profile") != caps.get_str("profile")
            || current.get_str("level") != caps.get_str("level"))
    }

    fn apply_format(&self, ctx: &FormatContext<'_>, caps: &Caps) -> Result<()> {
        let profile_level = if self.settings.pass_profile_level {
            Some(Self::profile_level(caps)?)
        } else {
            None
        };
        let select_hwip = self.settings.use_second_hwip && self.vendor.avc_second_hwip;
        if self.settings.use_second_hwip && !self.vendor.avc_second_hwip {
            tracing::warn!("component does not support decode core selection");
        }
        if select_hwip {
            Self::check_hwip_state(ctx)?;
        }

        with_port_update(
            ctx.input,
            |def| {
                if let Some(video) = def.video_format_mut() {
                    video.compression = VideoCoding::Avc;
                }
            },
            || {
                if let Some((profile, level)) = profile_level {
                    Self::set_profile_level(ctx, profile, level)?;
                }
                if select_hwip {
                    ctx.component.set_parameter(&Param::AvcSelectHwip(HwipSelectParam {
                        port_index: ctx.input.index(),
                        core: SECOND_IP_CORE,
                    }))?;
                }
                Ok(())
            },
        )
    }
}
