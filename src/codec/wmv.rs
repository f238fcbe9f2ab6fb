//! WMV video decoder.
//!
//! Simple and main profile streams carry their sequence layer in the
//! container, so the component expects a synthesized 24-byte header in
//! place of the raw `codec_data`. Advanced profile (`WVC1`) streams carry
//! their own sequence headers and are passed through untouched.

use super::{CodecKind, FormatContext, FormatTranslator, VendorExtensions, with_port_update};
use crate::caps::Caps;
use crate::error::{Error, Result};
use crate::omx::VideoCoding;
use std::sync::atomic::{AtomicBool, Ordering};

/// Size of a synthesized sequence header.
pub const SEQUENCE_HEADER_SIZE: usize = 24;

const SEQUENCE_START: u32 = 0xc500_0000;
const STRUCT_C_SIZE: u32 = 0x0000_0004;
const STRUCT_B_SIZE: u32 = 0x0000_000c;

/// Build the sequence layer header for a simple/main profile stream.
///
/// Layout (little-endian words): start code, STRUCT_C size, the first four
/// bytes of `codec_data`, height, width, STRUCT_B size.
pub fn sequence_header(
    codec_data: &[u8],
    width: u32,
    height: u32,
) -> Result<[u8; SEQUENCE_HEADER_SIZE]> {
    let struct_c = codec_data.get(..4).ok_or_else(|| {
        Error::InvalidConfig(format!(
            "codec_data too short for sequence header: {} bytes",
            codec_data.len()
        ))
    })?;

    let mut header = [0u8; SEQUENCE_HEADER_SIZE];
    header[0..4].copy_from_slice(&SEQUENCE_START.to_le_bytes());
    header[4..8].copy_from_slice(&STRUCT_C_SIZE.to_le_bytes());
    header[8..12].copy_from_slice(struct_c);
    header[12..16].copy_from_slice(&height.to_le_bytes());
    header[16..20].copy_from_slice(&width.to_le_bytes());
    header[20..24].copy_from_slice(&STRUCT_B_SIZE.to_le_bytes());
    Ok(header)
}

/// WMV decoder translator.
#[derive(Debug)]
pub struct WmvDecoder {
    vendor: VendorExtensions,
    advanced_profile: AtomicBool,
}

impl WmvDecoder {
    /// Create a translator.
    pub fn new(vendor: VendorExtensions) -> Self {
        Self {
            vendor,
            advanced_profile: AtomicBool::new(false),
        }
    }

    /// Whether the last prepared stream was VC-1 advanced profile.
    pub fn is_advanced_profile(&self) -> bool {
        self.advanced_profile.load(Ordering::Relaxed)
    }
}

impl FormatTranslator for WmvDecoder {
    fn kind(&self) -> CodecKind {
        CodecKind::WmvDec
    }

    fn is_format_change(&self, _ctx: &FormatContext<'_>, _caps: &Caps) -> Result<bool> {
        Ok(false)
    }

    fn apply_format(&self, ctx: &FormatContext<'_>, _caps: &Caps) -> Result<()> {
        with_port_update(
            ctx.input,
            |def| {
                if let Some(video) = def.video_format_mut() {
                    video.compression = VideoCoding::Wmv;
                }
            },
            || Ok(()),
        )
    }

    fn prepare_codec_data(
        &self,
        ctx: &FormatContext<'_>,
        codec_data: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        let advanced = ctx
            .current_caps
            .and_then(|caps| caps.get_str("format"))
            .is_some_and(|fourcc| fourcc.starts_with("WVC1"));
        self.advanced_profile.store(advanced, Ordering::Relaxed);

        if advanced {
            tracing::debug!("VC-1 advanced profile stream");
            return Ok(None);
        }
        if !self.vendor.wmv_sequence_header {
            return Ok(None);
        }

        let definition = ctx.input.definition();
        let video = definition
            .video_format()
            .ok_or_else(|| Error::Invariant("WMV input port is not a video port".into()))?;
        let header = sequence_header(codec_data, video.frame_width, video.frame_height)?;
        Ok(Some(header.to_vec()))
    }
}
