//! Port definitions and related enums.

/// Data flow direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Pipeline to hardware.
    Input,
    /// Hardware to pipeline.
    Output,
}

/// Whether an acquire may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Block until a buffer is available or the port flushes.
    #[default]
    Wait,
    /// Return immediately if nothing is available.
    DontWait,
}

/// Lifecycle state of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    /// Component failed irrecoverably.
    Invalid,
    /// Loaded, no resources held.
    Loaded,
    /// Resources allocated, not processing.
    Idle,
    /// Processing buffers.
    Executing,
    /// Paused.
    Pause,
    /// Waiting for resources.
    WaitForResources,
}

/// Video compression format of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoCoding {
    /// Raw (uncompressed) video.
    #[default]
    Unused,
    /// H.264 / AVC.
    Avc,
    /// VP8.
    Vp8,
    /// VP9.
    Vp9,
    /// Windows Media Video.
    Wmv,
}

/// Audio encoding of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioCoding {
    /// Unspecified.
    #[default]
    Unused,
    /// Linear PCM.
    Pcm,
    /// AAC.
    Aac,
    /// Windows Media Audio.
    Wma,
}

/// Raw color format of a video port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorFormat {
    /// Unspecified.
    #[default]
    Unused,
    /// Planar YUV 4:2:0.
    Yuv420Planar,
    /// Semi-planar YUV 4:2:0.
    Yuv420SemiPlanar,
    /// Semi-planar YUV 4:2:2.
    Yuv422SemiPlanar,
    /// 32-bit ARGB.
    Argb8888,
}

/// Video-specific part of a port definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoPortFormat {
    /// Frame width in pixels.
    pub frame_width: u32,
    /// Frame height in pixels.
    pub frame_height: u32,
    /// Row pitch in bytes (nStride).
    pub stride: i32,
    /// Rows per plane allocation (nSliceHeight).
    pub slice_height: u32,
    /// Frame rate in Q16.
    pub framerate_q16: u32,
    /// Target bitrate.
    pub bitrate: u32,
    /// Compression format.
    pub compression: VideoCoding,
    /// Color format for raw video.
    pub color_format: ColorFormat,
}

/// Audio-specific part of a port definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioPortFormat {
    /// Encoding.
    pub encoding: AudioCoding,
}

/// Domain of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDomain {
    /// Video data.
    Video(VideoPortFormat),
    /// Audio data.
    Audio(AudioPortFormat),
    /// Anything else.
    Other,
}

/// Negotiated definition of a port (OMX_PARAM_PORTDEFINITIONTYPE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDefinition {
    /// Port index.
    pub index: u32,
    /// Direction.
    pub direction: Direction,
    /// Number of buffers that will be allocated.
    pub buffer_count_actual: u32,
    /// Minimum number of buffers required.
    pub buffer_count_min: u32,
    /// Size of each buffer in bytes.
    pub buffer_size: u32,
    /// Required buffer alignment in bytes.
    pub buffer_alignment: u32,
    /// Whether the port is enabled.
    pub enabled: bool,
    /// Domain-specific format.
    pub domain: PortDomain,
}

impl PortDefinition {
    /// Create a video port definition.
    pub fn video(index: u32, direction: Direction, format: VideoPortFormat) -> Self {
        Self {
            index,
            direction,
            buffer_count_actual: 0,
            buffer_count_min: 0,
            buffer_size: 0,
            buffer_alignment: 0,
            enabled: true,
            domain: PortDomain::Video(format),
        }
    }

    /// Create an audio port definition.
    pub fn audio(index: u32, direction: Direction, encoding: AudioCoding) -> Self {
        Self {
            index,
            direction,
            buffer_count_actual: 0,
            buffer_count_min: 0,
            buffer_size: 0,
            buffer_alignment: 0,
            enabled: true,
            domain: PortDomain::Audio(AudioPortFormat { encoding }),
        }
    }

    /// Set buffer count, size and alignment.
    pub fn with_buffers(mut self, count: u32, size: u32, alignment: u32) -> Self {
        self.buffer_count_actual = count;
        self.buffer_count_min = count;
        self.buffer_size = size;
        self.buffer_alignment = alignment;
        self
    }

    /// Video format, if this is a video port.
    pub fn video_format(&self) -> Option<&VideoPortFormat> {
        match &self.domain {
            PortDomain::Video(v) => Some(v),
            _ => None,
        }
    }

    /// Mutable video format, if this is a video port.
    pub fn video_format_mut(&mut self) -> Option<&mut VideoPortFormat> {
        match &mut self.domain {
            PortDomain::Video(v) => Some(v),
            _ => None,
        }
    }

    /// Mutable audio format, if this is an audio port.
    pub fn audio_format_mut(&mut self) -> Option<&mut AudioPortFormat> {
        match &mut self.domain {
            PortDomain::Audio(a) => Some(a),
            _ => None,
        }
    }

    /// True for uncompressed video ports.
    pub fn is_raw_video(&self) -> bool {
        matches!(
            self.domain,
            PortDomain::Video(VideoPortFormat {
                compression: VideoCoding::Unused,
                ..
            })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_video_detection() {
        let raw = PortDefinition::video(1, Direction::Output, VideoPortFormat::default());
        assert!(raw.is_raw_video());

        let coded = PortDefinition::video(
            0,
            Direction::Input,
            VideoPortFormat {
                compression: VideoCoding::Avc,
                ..Default::default()
            },
        );
        assert!(!coded.is_raw_video());

        let audio = PortDefinition::audio(0, Direction::Input, AudioCoding::Aac);
        assert!(!audio.is_raw_video());
        assert!(audio.video_format().is_none());
    }
}
