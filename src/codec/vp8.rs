//! VP8 video encoder.
//!
//! Unlike the decoders, the encoder configures its output port, and takes
//! profile and level from what the downstream peer accepts.

use super::{CodecKind, FormatContext, FormatTranslator, VendorExtensions, with_port_update};
use crate::caps::Caps;
use crate::error::{Error, Result};
use crate::omx::{OmxError, Param, ProfileLevelParam, VideoCoding, Vp8MiscParam, Vp8Param};

const VP8_PROFILE_MAIN: u32 = 0x01;
const VP8_LEVELS: [&str; 4] = ["0", "1", "2", "3"];

const MAX_SHARPNESS: u32 = 7;
const MAX_DCT_PARTITIONS: u32 = 1;

/// Encoder settings. `None` keeps the component default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vp8EncoderSettings {
    /// Frames between intra frames.
    pub intra_interval: Option<u32>,
    /// Loop filter sharpness, 0 to 7.
    pub sharpness: Option<u32>,
    /// DCT residual partitions, 0 or 1.
    pub dct_partitions: u32,
}

impl Vp8EncoderSettings {
    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if let Some(sharpness) = self.sharpness.filter(|s| *s > MAX_SHARPNESS) {
            return Err(Error::InvalidConfig(format!(
                "sharpness {sharpness} out of range 0..={MAX_SHARPNESS}"
            )));
        }
        if self.dct_partitions > MAX_DCT_PARTITIONS {
            return Err(Error::InvalidConfig(format!(
                "dct-partitions {} out of range 0..={MAX_DCT_PARTITIONS}",
                self.dct_partitions
            )));
        }
        Ok(())
    }
}

/// VP8 encoder translator.
#[derive(Debug)]
pub struct Vp8Encoder {
    settings: Vp8EncoderSettings,
    vendor: VendorExtensions,
}

impl Vp8Encoder {
    /// Create a translator.
    pub fn new(settings: Vp8EncoderSettings, vendor: VendorExtensions) -> Self {
        Self { settings, vendor }
    }

    /// Current settings.
    pub fn settings(&self) -> Vp8EncoderSettings {
        self.settings
    }

    /// Profile and level requested by the peer; unset fields keep `current`.
    fn peer_profile_level(
        peer: &Caps,
        mut current: ProfileLevelParam,
    ) -> Result<ProfileLevelParam> {
        if let Some(profile) = peer.get_str("profile") {
            if profile != "main" {
                return Err(Error::unsupported("profile", profile));
            }
            current.profile = VP8_PROFILE_MAIN;
        }
        if let Some(level) = peer.get_str("level") {
            let bit = VP8_LEVELS
                .iter()
                .position(|l| *l == level)
                .ok_or_else(|| Error::unsupported("level", level))?;
            current.level = 1 << bit;
        }
        Ok(current)
    }

    fn current_profile_level(
        ctx: &FormatContext<'_>,
    ) -> std::result::Result<ProfileLevelParam, OmxError> {
        let mut param = Param::ProfileLevel(ProfileLevelParam {
            port_index: ctx.output.index(),
            profile: 0,
            level: 0,
        });
        ctx.component.get_parameter(&mut param)?;
        match param {
            Param::ProfileLevel(pl) => Ok(pl),
            _ => Err(OmxError::Undefined),
        }
    }

    fn apply_misc(&self, ctx: &FormatContext<'_>) -> Result<()> {
        if self.settings.intra_interval.is_none() && self.settings.sharpness.is_none() {
            return Ok(());
        }
        if !self.vendor.vp8_misc {
            tracing::warn!("component does not support intra interval or sharpness, ignoring");
            return Ok(());
        }

        let mut param = Param::Vp8Misc(Vp8MiscParam::default());
        ctx.component.get_parameter(&mut param)?;
        if let Param::Vp8Misc(misc) = &mut param {
            tracing::debug!(
                p_frames = misc.p_frames,
                sharpness = misc.sharpness,
                "default VP8 settings"
            );
            if let Some(interval) = self.settings.intra_interval {
                misc.p_frames = interval;
            }
            if let Some(sharpness) = self.settings.sharpness {
                misc.sharpness = sharpness;
            }
        }
        ctx.component.set_parameter(&param)?;
        Ok(())
    }

    fn apply_partitions(&self, ctx: &FormatContext<'_>) -> Result<()> {
        if self.settings.dct_partitions == 0 {
            return Ok(());
        }
        let mut param = Param::Vp8(Vp8Param {
            port_index: ctx.output.index(),
            ..Default::default()
        });
        ctx.component.get_parameter(&mut param)?;
        if let Param::Vp8(vp8) = &mut param {
            vp8.dct_partitions = self.settings.dct_partitions;
        }
        ctx.component.set_parameter(&param)?;
        Ok(())
    }
}

impl FormatTranslator for Vp8Encoder {
    fn kind(&self) -> CodecKind {
        CodecKind::Vp8Enc
    }

    fn is_format_change(&self, _ctx: &FormatContext<'_>, _caps: &Caps) -> Result<bool> {
        Ok(false)
    }

    fn apply_format(&self, ctx: &FormatContext<'_>, _caps: &Caps) -> Result<()> {
        self.settings.validate()?;
        if let Some(peer) = ctx.peer_caps {
            Self::peer_profile_level(peer, ProfileLevelParam {
                port_index: ctx.output.index(),
                profile: 0,
                level: 0,
            })?;
        }

        with_port_update(
            ctx.output,
            |def| {
                if let Some(video) = def.video_format_mut() {
                    video.compression = VideoCoding::Vp8;
                }
            },
            || {
                self.apply_misc(ctx)?;
                self.apply_partitions(ctx)?;

                let current = match Self::current_profile_level(ctx) {
                    Ok(current) => current,
                    Err(_) => {
                        tracing::warn!("setting profile/level not supported by component");
                        return Ok(());
                    }
                };
                let requested = match ctx.peer_caps {
                    Some(peer) => Self::peer_profile_level(peer, current)?,
                    None => current,
                };
                match ctx.component.set_parameter(&Param::ProfileLevel(requested)) {
                    Ok(()) => Ok(()),
                    Err(OmxError::UnsupportedIndex) => {
                        tracing::warn!("setting profile/level not supported by component");
                        Ok(())
                    }
                    Err(err) => Err(err.into()),
                }
            },
        )
    }

    /// `video/x-vp8` with the profile and level the component settled on.
    fn output_caps(&self, ctx: &FormatContext<'_>) -> Result<Option<Caps>> {
        let mut caps = Caps::new("video/x-vp8");
        match Self::current_profile_level(ctx) {
            Ok(pl) => {
                if pl.profile != VP8_PROFILE_MAIN {
                    return Err(Error::unsupported("profile", pl.profile));
                }
                let level = (0..VP8_LEVELS.len())
                    .find(|bit| pl.level == 1 << bit)
                    .map(|bit| VP8_LEVELS[bit])
                    .ok_or_else(|| Error::unsupported("level", pl.level))?;
                caps.set("profile", "main");
                caps.set("level", level);
            }
            Err(OmxError::UnsupportedIndex) => {}
            Err(err) => return Err(err.into()),
        }
        Ok(Some(caps))
    }
}
