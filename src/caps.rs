//! Stream descriptions (caps).
//!
//! A [`Caps`] names a media type (`video/x-raw`, `audio/mpeg`, ...), carries
//! typed fields and an optional set of caps features such as
//! [`CAPS_FEATURE_MEMORY_DMABUF`]. Only fixed values are modeled; template
//! caps with ranges are kept as strings on the codec kinds.
//!
//! ```rust
//! use omxbridge::caps::{CAPS_FEATURE_MEMORY_DMABUF, Caps};
//!
//! let caps = Caps::builder("video/x-raw")
//!     .field("format", "NV12")
//!     .field("width", 640)
//!     .field("height", 480)
//!     .feature(CAPS_FEATURE_MEMORY_DMABUF)
//!     .build();
//!
//! assert!(caps.has_feature(CAPS_FEATURE_MEMORY_DMABUF));
//! assert_eq!(caps.get_int("width"), Some(640));
//! ```

use smallvec::SmallVec;
use std::fmt;

/// Caps feature marking DMA-BUF backed memory.
pub const CAPS_FEATURE_MEMORY_DMABUF: &str = "memory:DMABuf";

/// A typed caps field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Integer.
    Int(i64),
    /// String.
    Str(String),
    /// Boolean.
    Bool(bool),
    /// Fraction (numerator, denominator).
    Fraction(i32, i32),
    /// Opaque bytes, e.g. `codec_data`.
    Buffer(Vec<u8>),
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Buffer(v)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "(int){v}"),
            FieldValue::Str(v) => write!(f, "(string){v}"),
            FieldValue::Bool(v) => write!(f, "(boolean){v}"),
            FieldValue::Fraction(n, d) => write!(f, "(fraction){n}/{d}"),
            FieldValue::Buffer(v) => {
                write!(f, "(buffer)")?;
                v.iter().try_for_each(|b| write!(f, "{b:02x}"))
            }
        }
    }
}

/// A fixed stream description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caps {
    name: String,
    fields: Vec<(String, FieldValue)>,
    features: SmallVec<[String; 1]>,
}

impl Caps {
    /// Caps with a media type and no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            features: SmallVec::new(),
        }
    }

    /// Start building caps.
    pub fn builder(name: impl Into<String>) -> CapsBuilder {
        CapsBuilder {
            caps: Caps::new(name),
        }
    }

    /// Media type.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this describes raw video.
    pub fn is_raw_video(&self) -> bool {
        self.name == "video/x-raw"
    }

    /// Set (or replace) a field.
    pub fn set(&mut self, key: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.fields.push((key.to_owned(), value)),
        }
    }

    /// Raw field value.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Whether a field is present.
    pub fn has_field(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Integer field.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// String field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            FieldValue::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Boolean field.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Buffer field.
    pub fn get_buffer(&self, key: &str) -> Option<&[u8]> {
        match self.get(key)? {
            FieldValue::Buffer(v) => Some(v),
            _ => None,
        }
    }

    /// Add a caps feature.
    pub fn add_feature(&mut self, feature: &str) {
        if !self.has_feature(feature) {
            self.features.push(feature.to_owned());
        }
    }

    /// Whether a caps feature is present.
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.features.is_empty() {
            write!(f, "({})", self.features.join(", "))?;
        }
        for (key, value) in &self.fields {
            write!(f, ", {key}={value}")?;
        }
        Ok(())
    }
}

/// Builder returned by [`Caps::builder`].
#[derive(Debug)]
pub struct CapsBuilder {
    caps: Caps,
}

impl CapsBuilder {
    /// Add a field.
    pub fn field(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.caps.set(key, value);
        self
    }

    /// Add a caps feature.
    pub fn feature(mut self, feature: &str) -> Self {
        self.caps.add_feature(feature);
        self
    }

    /// Finish.
    pub fn build(self) -> Caps {
        self.caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let caps = Caps::builder("audio/mpeg")
            .field("mpegversion", 4)
            .field("stream-format", "adts")
            .field("framed", true)
            .field("codec_data", vec![0x12u8, 0x10])
            .build();

        assert_eq!(caps.get_int("mpegversion"), Some(4));
        assert_eq!(caps.get_str("stream-format"), Some("adts"));
        assert_eq!(caps.get_bool("framed"), Some(true));
        assert_eq!(caps.get_buffer("codec_data"), Some(&[0x12, 0x10][..]));
        assert_eq!(caps.get_int("stream-format"), None);
        assert!(!caps.has_field("rate"));
    }

    #[test]
    fn test_set_replaces() {
        let mut caps = Caps::new("video/x-raw");
        caps.set("width", 640);
        caps.set("width", 1280);
        assert_eq!(caps.get_int("width"), Some(1280));
    }

    #[test]
    fn test_display() {
        let caps = Caps::builder("video/x-raw")
            .feature(CAPS_FEATURE_MEMORY_DMABUF)
            .field("format", "NV12")
            .field("width", 640)
            .build();
        assert_eq!(
            caps.to_string(),
            "video/x-raw(memory:DMABuf), format=(string)NV12, width=(int)640"
        );
    }
}
