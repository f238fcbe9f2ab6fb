//! VP9 video decoder.

use super::{CodecKind, FormatContext, FormatTranslator, VendorExtensions, with_port_update};
use crate::caps::Caps;
use crate::error::Result;
use crate::omx::{HardwareBuffer, VideoCoding};

/// VP9 decoder translator.
///
/// VP9 streams may change resolution on any key frame; the new size is read
/// from the decode result attached to the output buffer.
#[derive(Debug)]
pub struct Vp9Decoder {
    vendor: VendorExtensions,
}

impl Vp9Decoder {
    /// Create a translator.
    pub fn new(vendor: VendorExtensions) -> Self {
        Self { vendor }
    }
}

impl FormatTranslator for Vp9Decoder {
    fn kind(&self) -> CodecKind {
        CodecKind::Vp9Dec
    }

    fn is_format_change(&self, _ctx: &FormatContext<'_>, _caps: &Caps) -> Result<bool> {
        Ok(false)
    }

    fn apply_format(&self, ctx: &FormatContext<'_>, _caps: &Caps) -> Result<()> {
        let native = self.vendor.vp9_coding;
        if !native {
            tracing::warn!("component has no VP9 compression format, keeping port format");
        }
        with_port_update(
            ctx.input,
            |def| {
                if let (true, Some(video)) = (native, def.video_format_mut()) {
                    video.compression = VideoCoding::Vp9;
                }
            },
            || Ok(()),
        )
    }

    fn dynamic_resolution(&self, buffer: &HardwareBuffer, current: (u32, u32)) -> (u32, u32) {
        if !self.vendor.decode_result {
            return current;
        }
        match buffer.decode_result() {
            Some(result) => {
                tracing::debug!(
                    width = result.picture_width,
                    height = result.picture_height,
                    "resolution from decode result"
                );
                (result.picture_width, result.picture_height)
            }
            None => current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::omx::sim::{SimBacking, SimComponent, SimPort};
    use crate::omx::{
        DecodeResult, Direction, HardwarePort, PortDefinition, VideoPortFormat,
    };

    fn ports() -> (SimPort, SimPort) {
        let input = PortDefinition::video(0, Direction::Input, VideoPortFormat::default());
        let output = PortDefinition::video(1, Direction::Output, VideoPortFormat::default())
            .with_buffers(2, 4096, 16);
        (
            SimPort::new(input, SimBacking::System),
            SimPort::new(output, SimBacking::System),
        )
    }

    #[test]
    fn test_apply_sets_vp9_coding() {
        let (input, output) = ports();
        let comp = SimComponent::new("OMX.RENESAS.VIDEO.DECODER.VP9");
        let ctx = FormatContext::new(&comp, &input, &output);
        let caps = Caps::builder("video/x-vp9").field("width", 1280).field("height", 720).build();

        Vp9Decoder::new(VendorExtensions::all()).apply_format(&ctx, &caps).unwrap();
        assert_eq!(
            input.definition().video_format().map(|v| v.compression),
            Some(VideoCoding::Vp9)
        );

        let (input, output) = ports();
        let ctx = FormatContext::new(&comp, &input, &output);
        Vp9Decoder::new(VendorExtensions::none()).apply_format(&ctx, &caps).unwrap();
        assert_eq!(
            input.definition().video_format().map(|v| v.compression),
            Some(VideoCoding::Unused)
        );
    }

    #[test]
    fn test_dynamic_resolution_from_decode_result() {
        let (_, output) = ports();
        output.allocate_buffers().unwrap();
        let dec = Vp9Decoder::new(VendorExtensions::all());
        let buffer = output.buffer(0).unwrap();

        assert_eq!(dec.dynamic_resolution(&buffer, (1280, 720)), (1280, 720));

        output.set_decode_result(
            0,
            Some(DecodeResult {
                phys_y: 0,
                picture_width: 1920,
                picture_height: 1080,
            }),
        );
        assert_eq!(dec.dynamic_resolution(&buffer, (1280, 720)), (1920, 1080));

        let plain = Vp9Decoder::new(VendorExtensions::none());
        assert_eq!(plain.dynamic_resolution(&buffer, (1280, 720)), (1280, 720));
    }
}
