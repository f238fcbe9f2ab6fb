//! Typed component parameters.
//!
//! Each struct mirrors one OpenMAX IL parameter (or vendor extension)
//! that format negotiation reads or writes.

/// Identifies a parameter kind independent of its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamIndex {
    /// OMX_IndexParamVideoProfileLevelCurrent.
    ProfileLevelCurrent,
    /// OMX_IndexParamAudioAac.
    AudioAac,
    /// OMX_IndexParamAudioWma.
    AudioWma,
    /// OMX_IndexParamAudioPcm.
    AudioPcm,
    /// OMX_IndexParamVideoVp8.
    VideoVp8,
    /// Vendor VP8 miscellaneous encoder settings.
    VideoVp8Misc,
    /// Vendor AAC down-mix switch.
    AudioAacDownmix,
    /// Vendor H.264 hardware IP selection.
    VideoAvcSelectHwip,
    /// Vendor audio output unit.
    AudioOutputUnit,
}

/// Profile and level of a video port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileLevelParam {
    /// Port index.
    pub port_index: u32,
    /// Codec-specific profile value.
    pub profile: u32,
    /// Codec-specific level value.
    pub level: u32,
}

/// AAC stream framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AacStreamFormat {
    /// MPEG-2 ADTS.
    Mp2Adts,
    /// MPEG-4 ADTS.
    Mp4Adts,
    /// MPEG-4 LOAS.
    Mp4Loas,
    /// MPEG-4 LATM.
    Mp4Latm,
    /// ADIF.
    Adif,
    /// MPEG-4 file format.
    Mp4Ff,
    /// Raw access units.
    #[default]
    Raw,
}

/// AAC decoder input parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AacParam {
    /// Port index.
    pub port_index: u32,
    /// Channel count.
    pub channels: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bitrate (0 = unknown).
    pub bit_rate: u32,
    /// Audio bandwidth (0 = decoder decides).
    pub audio_bandwidth: u32,
    /// Stream framing.
    pub stream_format: AacStreamFormat,
}

/// WMA decoder input parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WmaParam {
    /// Port index.
    pub port_index: u32,
    /// Channel count.
    pub channels: u32,
    /// Bitrate.
    pub bit_rate: u32,
    /// Sample rate in Hz.
    pub sampling_rate: u32,
    /// Block alignment in bytes.
    pub block_align: u32,
    /// Encoder options from the codec data.
    pub encode_options: u16,
    /// Super block alignment from the codec data.
    pub super_block_align: u32,
}

/// PCM output parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PcmParam {
    /// Port index.
    pub port_index: u32,
    /// Channel count.
    pub channels: u32,
    /// Sample rate in Hz.
    pub sampling_rate: u32,
}

/// VP8 encoder parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vp8Param {
    /// Port index.
    pub port_index: u32,
    /// Number of DCT token partitions.
    pub dct_partitions: u32,
}

/// Vendor VP8 encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vp8MiscParam {
    /// Frames between intra frames.
    pub p_frames: u32,
    /// Loop filter sharpness.
    pub sharpness: u32,
}

/// Vendor AAC down-mix switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AacDownmixParam {
    /// Port index.
    pub port_index: u32,
    /// Down-mix multichannel audio to stereo.
    pub enable: bool,
}

/// Vendor H.264 hardware IP selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HwipSelectParam {
    /// Port index.
    pub port_index: u32,
    /// Decode core to use.
    pub core: u32,
}

/// Unit in which the decoder delivers output buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputUnit {
    /// One buffer per decoded frame.
    #[default]
    Frame,
    /// One buffer per input payload.
    Payload,
}

/// Vendor audio output unit selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputUnitParam {
    /// Port index.
    pub port_index: u32,
    /// Output unit.
    pub unit: OutputUnit,
}

/// A component parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// Current profile/level.
    ProfileLevel(ProfileLevelParam),
    /// AAC input.
    Aac(AacParam),
    /// WMA input.
    Wma(WmaParam),
    /// PCM output.
    Pcm(PcmParam),
    /// VP8 encoder.
    Vp8(Vp8Param),
    /// Vendor VP8 misc settings.
    Vp8Misc(Vp8MiscParam),
    /// Vendor AAC down-mix.
    AacDownmix(AacDownmixParam),
    /// Vendor H.264 IP selection.
    AvcSelectHwip(HwipSelectParam),
    /// Vendor output unit.
    AudioOutputUnit(OutputUnitParam),
}

impl Param {
    /// Parameter kind.
    pub fn index(&self) -> ParamIndex {
        match self {
            Param::ProfileLevel(_) => ParamIndex::ProfileLevelCurrent,
            Param::Aac(_) => ParamIndex::AudioAac,
            Param::Wma(_) => ParamIndex::AudioWma,
            Param::Pcm(_) => ParamIndex::AudioPcm,
            Param::Vp8(_) => ParamIndex::VideoVp8,
            Param::Vp8Misc(_) => ParamIndex::VideoVp8Misc,
            Param::AacDownmix(_) => ParamIndex::AudioAacDownmix,
            Param::AvcSelectHwip(_) => ParamIndex::VideoAvcSelectHwip,
            Param::AudioOutputUnit(_) => ParamIndex::AudioOutputUnit,
        }
    }

    /// Port the parameter applies to. Component-wide parameters report `None`.
    pub fn port_index(&self) -> Option<u32> {
        match self {
            Param::ProfileLevel(p) => Some(p.port_index),
            Param::Aac(p) => Some(p.port_index),
            Param::Wma(p) => Some(p.port_index),
            Param::Pcm(p) => Some(p.port_index),
            Param::Vp8(p) => Some(p.port_index),
            Param::Vp8Misc(_) => None,
            Param::AacDownmix(p) => Some(p.port_index),
            Param::AvcSelectHwip(p) => Some(p.port_index),
            Param::AudioOutputUnit(p) => Some(p.port_index),
        }
    }
}
