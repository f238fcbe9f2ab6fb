//! Raw video layout.
//!
//! Two layouts matter for a hardware video buffer:
//!
//! - the *natural* layout a pipeline consumer assumes when a buffer carries
//!   no plane metadata ([`VideoInfo::new`]): rows padded to 4 bytes, chroma
//!   planes packed right after luma
//! - the *hardware* layout derived from the port's stride and slice height
//!   ([`HardwareLayout::new`])
//!
//! When the two differ, downstream needs a [`VideoMeta`] describing the real
//! plane positions, or a copy.

use crate::caps::Caps;
use crate::error::{Error, Result};

/// Maximum number of planes in a video frame.
pub const MAX_PLANES: usize = 4;

// ============================================================================
// VideoFormat
// ============================================================================

/// Raw video formats a hardware port can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoFormat {
    /// YUV 4:2:0 planar (Y, U, V).
    I420,
    /// YUV 4:2:0 semi-planar (Y, interleaved UV).
    Nv12,
    /// 10-bit NV12, three samples packed per 32-bit word.
    Nv12_10Le32,
    /// YUV 4:2:2 semi-planar.
    Nv16,
    /// 10-bit NV16, three samples packed per 32-bit word.
    Nv16_10Le32,
    /// 32-bit ARGB.
    Argb,
    /// 32-bit ABGR.
    Abgr,
    /// 16-bit RGB 5:6:5.
    Rgb16,
    /// 16-bit BGR 5:6:5.
    Bgr16,
    /// Packed YUV 4:2:2 (Y0 U Y1 V).
    Yuy2,
    /// Packed YUV 4:2:2 (U Y0 V Y1).
    Uyvy,
    /// Packed YUV 4:2:2 (Y0 V Y1 U).
    Yvyu,
    /// 8-bit grayscale.
    Gray8,
}

impl VideoFormat {
    /// Parse a caps format string.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "I420" => VideoFormat::I420,
            "NV12" => VideoFormat::Nv12,
            "NV12_10LE32" => VideoFormat::Nv12_10Le32,
            "NV16" => VideoFormat::Nv16,
            "NV16_10LE32" => VideoFormat::Nv16_10Le32,
            "ARGB" => VideoFormat::Argb,
            "ABGR" => VideoFormat::Abgr,
            "RGB16" => VideoFormat::Rgb16,
            "BGR16" => VideoFormat::Bgr16,
            "YUY2" => VideoFormat::Yuy2,
            "UYVY" => VideoFormat::Uyvy,
            "YVYU" => VideoFormat::Yvyu,
            "GRAY8" => VideoFormat::Gray8,
            _ => return None,
        })
    }

    /// Caps format string.
    pub fn name(&self) -> &'static str {
        match self {
            VideoFormat::I420 => "I420",
            VideoFormat::Nv12 => "NV12",
            VideoFormat::Nv12_10Le32 => "NV12_10LE32",
            VideoFormat::Nv16 => "NV16",
            VideoFormat::Nv16_10Le32 => "NV16_10LE32",
            VideoFormat::Argb => "ARGB",
            VideoFormat::Abgr => "ABGR",
            VideoFormat::Rgb16 => "RGB16",
            VideoFormat::Bgr16 => "BGR16",
            VideoFormat::Yuy2 => "YUY2",
            VideoFormat::Uyvy => "UYVY",
            VideoFormat::Yvyu => "YVYU",
            VideoFormat::Gray8 => "GRAY8",
        }
    }

    /// Number of planes.
    pub const fn n_planes(&self) -> usize {
        match self {
            VideoFormat::I420 => 3,
            VideoFormat::Nv12
            | VideoFormat::Nv12_10Le32
            | VideoFormat::Nv16
            | VideoFormat::Nv16_10Le32 => 2,
            _ => 1,
        }
    }

    /// Whether chroma is subsampled vertically (4:2:0).
    const fn chroma_halved_vertically(&self) -> bool {
        matches!(
            self,
            VideoFormat::I420 | VideoFormat::Nv12 | VideoFormat::Nv12_10Le32
        )
    }
}

const fn round_up_2(v: usize) -> usize {
    (v + 1) & !1
}

const fn round_up_4(v: usize) -> usize {
    (v + 3) & !3
}

// ============================================================================
// VideoInfo
// ============================================================================

/// Geometry and natural plane layout of a raw video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    /// Pixel format.
    pub format: VideoFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Number of planes.
    pub n_planes: usize,
    /// Bytes per row, per plane.
    pub stride: [usize; MAX_PLANES],
    /// Byte offset of each plane.
    pub offset: [usize; MAX_PLANES],
    /// Total frame size.
    pub size: usize,
}

impl VideoInfo {
    /// Compute the natural layout for `format` at `width`×`height`.
    pub fn new(format: VideoFormat, width: u32, height: u32) -> Self {
        let w = width as usize;
        let h = height as usize;
        let mut stride = [0; MAX_PLANES];
        let mut offset = [0; MAX_PLANES];

        let size = match format {
            VideoFormat::I420 => {
                stride[0] = round_up_4(w);
                stride[1] = round_up_4(round_up_2(w) / 2);
                stride[2] = stride[1];
                offset[1] = stride[0] * round_up_2(h);
                offset[2] = offset[1] + stride[1] * (round_up_2(h) / 2);
                offset[2] + stride[2] * (round_up_2(h) / 2)
            }
            VideoFormat::Nv12 => {
                stride[0] = round_up_4(w);
                stride[1] = stride[0];
                offset[1] = stride[0] * round_up_2(h);
                offset[1] + stride[0] * (round_up_2(h) / 2)
            }
            VideoFormat::Nv12_10Le32 => {
                stride[0] = (w + 2) / 3 * 4;
                stride[1] = stride[0];
                offset[1] = stride[0] * round_up_2(h);
                offset[1] + stride[0] * (round_up_2(h) / 2)
            }
            VideoFormat::Nv16 => {
                stride[0] = round_up_4(w);
                stride[1] = stride[0];
                offset[1] = stride[0] * h;
                offset[1] * 2
            }
            VideoFormat::Nv16_10Le32 => {
                stride[0] = (w + 2) / 3 * 4;
                stride[1] = stride[0];
                offset[1] = stride[0] * h;
                offset[1] * 2
            }
            VideoFormat::Argb | VideoFormat::Abgr => {
                stride[0] = w * 4;
                stride[0] * h
            }
            VideoFormat::Rgb16
            | VideoFormat::Bgr16
            | VideoFormat::Yuy2
            | VideoFormat::Uyvy
            | VideoFormat::Yvyu => {
                stride[0] = round_up_4(w * 2);
                stride[0] * h
            }
            VideoFormat::Gray8 => {
                stride[0] = round_up_4(w);
                stride[0] * h
            }
        };

        Self {
            format,
            width,
            height,
            n_planes: format.n_planes(),
            stride,
            offset,
            size,
        }
    }

    /// Parse raw video caps.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidVideoCaps`] if the caps are not raw video or lack a
    /// known format or a positive width/height.
    pub fn from_caps(caps: &Caps) -> Result<Self> {
        let invalid = || Error::InvalidVideoCaps(caps.to_string());

        if !caps.is_raw_video() {
            return Err(invalid());
        }
        let format = caps
            .get_str("format")
            .and_then(VideoFormat::from_name)
            .ok_or_else(invalid)?;
        let dim = |key| {
            caps.get_int(key)
                .filter(|&v| v > 0)
                .and_then(|v| u32::try_from(v).ok())
        };
        let width = dim("width").ok_or_else(invalid)?;
        let height = dim("height").ok_or_else(invalid)?;

        Ok(Self::new(format, width, height))
    }
}

// ============================================================================
// Hardware layout
// ============================================================================

/// Plane layout implied by a port's stride and slice height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareLayout {
    /// Number of planes.
    pub n_planes: usize,
    /// Bytes per row, per plane.
    pub stride: [usize; MAX_PLANES],
    /// Byte offset of each plane.
    pub offset: [usize; MAX_PLANES],
    /// Allocated rows of each plane.
    pub rows: [usize; MAX_PLANES],
}

impl HardwareLayout {
    /// Compute the layout for `format` given the port's `nStride` and `nSliceHeight`.
    pub fn new(format: VideoFormat, nstride: usize, nslice: usize) -> Self {
        let mut stride = [0; MAX_PLANES];
        let mut offset = [0; MAX_PLANES];
        let mut rows = [0; MAX_PLANES];
        stride[0] = nstride;
        rows[0] = nslice;

        let chroma_rows = if format.chroma_halved_vertically() {
            nslice / 2
        } else {
            nslice
        };

        match format {
            VideoFormat::I420 => {
                stride[1] = nstride / 2;
                stride[2] = stride[1];
                offset[1] = nstride * nslice;
                offset[2] = offset[1] + stride[1] * (nslice / 2);
                rows[1] = chroma_rows;
                rows[2] = chroma_rows;
            }
            VideoFormat::Nv12
            | VideoFormat::Nv12_10Le32
            | VideoFormat::Nv16
            | VideoFormat::Nv16_10Le32 => {
                stride[1] = nstride;
                offset[1] = nstride * nslice;
                rows[1] = chroma_rows;
            }
            VideoFormat::Argb
            | VideoFormat::Abgr
            | VideoFormat::Rgb16
            | VideoFormat::Bgr16
            | VideoFormat::Yuy2
            | VideoFormat::Uyvy
            | VideoFormat::Yvyu
            | VideoFormat::Gray8 => {}
        }

        Self {
            n_planes: format.n_planes(),
            stride,
            offset,
            rows,
        }
    }

    /// Size in bytes of plane `plane`.
    pub fn plane_size(&self, plane: usize) -> usize {
        self.stride[plane] * self.rows[plane]
    }

    /// Indices of planes whose stride or offset differs from `info`'s natural layout.
    pub fn mismatched_planes(&self, info: &VideoInfo) -> impl Iterator<Item = usize> + '_ {
        let natural = *info;
        (0..self.n_planes).filter(move |&i| {
            self.stride[i] != natural.stride[i] || self.offset[i] != natural.offset[i]
        })
    }
}

// ============================================================================
// VideoMeta
// ============================================================================

/// Plane positions attached to a buffer whose layout is not the natural one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoMeta {
    /// Pixel format.
    pub format: VideoFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Number of planes.
    pub n_planes: usize,
    /// Byte offset of each plane within the buffer.
    pub offset: [usize; MAX_PLANES],
    /// Bytes per row, per plane.
    pub stride: [usize; MAX_PLANES],
}

impl VideoMeta {
    /// Metadata describing the natural layout of `info`.
    pub fn from_info(info: &VideoInfo) -> Self {
        Self {
            format: info.format,
            width: info.width,
            height: info.height,
            n_planes: info.n_planes,
            offset: info.offset,
            stride: info.stride,
        }
    }

    /// Metadata describing a hardware layout.
    pub fn from_layout(info: &VideoInfo, layout: &HardwareLayout) -> Self {
        Self {
            format: info.format,
            width: info.width,
            height: info.height,
            n_planes: layout.n_planes,
            offset: layout.offset,
            stride: layout.stride,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_nv12_layout() {
        let info = VideoInfo::new(VideoFormat::Nv12, 640, 480);
        assert_eq!(info.n_planes, 2);
        assert_eq!(&info.stride[..2], &[640, 640]);
        assert_eq!(&info.offset[..2], &[0, 640 * 480]);
        assert_eq!(info.size, 640 * 480 * 3 / 2);
    }

    #[test]
    fn test_natural_i420_odd_width() {
        let info = VideoInfo::new(VideoFormat::I420, 321, 241);
        assert_eq!(info.stride[0], 324);
        assert_eq!(info.stride[1], 164);
        assert_eq!(info.offset[1], 324 * 242);
        assert_eq!(info.offset[2], 324 * 242 + 164 * 121);
    }

    #[test]
    fn test_from_caps() {
        let caps = Caps::builder("video/x-raw")
            .field("format", "I420")
            .field("width", 1280)
            .field("height", 720)
            .build();
        let info = VideoInfo::from_caps(&caps).unwrap();
        assert_eq!(info.format, VideoFormat::I420);
        assert_eq!((info.width, info.height), (1280, 720));

        let missing = Caps::builder("video/x-raw").field("format", "NV12").build();
        assert!(matches!(
            VideoInfo::from_caps(&missing),
            Err(Error::InvalidVideoCaps(_))
        ));

        let unknown = Caps::builder("video/x-raw")
            .field("format", "P010")
            .field("width", 64)
            .field("height", 64)
            .build();
        assert!(VideoInfo::from_caps(&unknown).is_err());
    }

    #[test]
    fn test_hardware_layout_i420() {
        let layout = HardwareLayout::new(VideoFormat::I420, 768, 496);
        assert_eq!(&layout.stride[..3], &[768, 384, 384]);
        assert_eq!(layout.offset[1], 768 * 496);
        assert_eq!(layout.offset[2], 768 * 496 + 384 * 248);
        assert_eq!(layout.plane_size(1), 384 * 248);
    }

    #[test]
    fn test_hardware_layout_nv16_chroma_rows() {
        let layout = HardwareLayout::new(VideoFormat::Nv16, 640, 480);
        assert_eq!(layout.rows[1], 480);
        let layout = HardwareLayout::new(VideoFormat::Nv12, 640, 480);
        assert_eq!(layout.rows[1], 240);
    }

    #[test]
    fn test_mismatch_is_per_plane() {
        let info = VideoInfo::new(VideoFormat::Nv12, 640, 480);

        let same = HardwareLayout::new(VideoFormat::Nv12, 640, 480);
        assert_eq!(same.mismatched_planes(&info).count(), 0);

        // Same stride, taller slice: only the chroma offset moves.
        let padded = HardwareLayout::new(VideoFormat::Nv12, 640, 496);
        assert_eq!(padded.mismatched_planes(&info).collect::<Vec<_>>(), vec![1]);

        let wide = HardwareLayout::new(VideoFormat::Nv12, 768, 480);
        assert_eq!(wide.mismatched_planes(&info).collect::<Vec<_>>(), vec![0, 1]);
    }
}
