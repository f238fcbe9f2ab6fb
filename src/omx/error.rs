//! Hardware component error codes.

use std::fmt;

/// An error code reported by an OpenMAX IL component.
///
/// Displays as the symbolic name followed by the raw code, so messages
/// surfaced to the user always carry the hardware value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OmxError {
    /// Out of memory or other resources.
    InsufficientResources,
    /// Unspecified failure.
    Undefined,
    /// The component name is invalid.
    InvalidComponentName,
    /// No component with the given name exists.
    ComponentNotFound,
    /// A parameter value is invalid.
    BadParameter,
    /// The operation is not implemented.
    NotImplemented,
    /// Input buffer underflow.
    Underflow,
    /// Output buffer overflow.
    Overflow,
    /// Hardware failure.
    Hardware,
    /// The component is in an invalid state.
    InvalidState,
    /// The bitstream is corrupt.
    StreamCorrupt,
    /// Ports cannot be tunneled together.
    PortsNotCompatible,
    /// Resources were lost.
    ResourcesLost,
    /// No more indices.
    NoMore,
    /// Component version mismatch.
    VersionMismatch,
    /// The component is not ready.
    NotReady,
    /// A timeout occurred.
    Timeout,
    /// Already in the requested state.
    SameState,
    /// Resources were preempted.
    ResourcesPreempted,
    /// State transition not allowed.
    IncorrectStateTransition,
    /// Operation not allowed in the current state.
    IncorrectStateOperation,
    /// Setting is not supported.
    UnsupportedSetting,
    /// Parameter index is not supported.
    UnsupportedIndex,
    /// Port index is invalid.
    BadPortIndex,
    /// Port is not populated with buffers.
    PortUnpopulated,
    /// A vendor or otherwise unknown code.
    Other(u32),
}

impl OmxError {
    /// Raw OMX_ERRORTYPE value.
    pub const fn code(self) -> u32 {
        match self {
            OmxError::InsufficientResources => 0x8000_1000,
            OmxError::Undefined => 0x8000_1001,
            OmxError::InvalidComponentName => 0x8000_1002,
            OmxError::ComponentNotFound => 0x8000_1003,
            OmxError::BadParameter => 0x8000_1005,
            OmxError::NotImplemented => 0x8000_1006,
            OmxError::Underflow => 0x8000_1007,
            OmxError::Overflow => 0x8000_1008,
            OmxError::Hardware => 0x8000_1009,
            OmxError::InvalidState => 0x8000_100A,
            OmxError::StreamCorrupt => 0x8000_100B,
            OmxError::PortsNotCompatible => 0x8000_100C,
            OmxError::ResourcesLost => 0x8000_100D,
            OmxError::NoMore => 0x8000_100E,
            OmxError::VersionMismatch => 0x8000_100F,
            OmxError::NotReady => 0x8000_1010,
            OmxError::Timeout => 0x8000_1011,
            OmxError::SameState => 0x8000_1012,
            OmxError::ResourcesPreempted => 0x8000_1013,
            OmxError::IncorrectStateTransition => 0x8000_1017,
            OmxError::IncorrectStateOperation => 0x8000_1018,
            OmxError::UnsupportedSetting => 0x8000_1019,
            OmxError::UnsupportedIndex => 0x8000_101A,
            OmxError::BadPortIndex => 0x8000_101B,
            OmxError::PortUnpopulated => 0x8000_101C,
            OmxError::Other(code) => code,
        }
    }

    /// Convert a raw code. `0` (OMX_ErrorNone) maps to `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        const KNOWN: [OmxError; 25] = [
            OmxError::InsufficientResources,
            OmxError::Undefined,
            OmxError::InvalidComponentName,
            OmxError::ComponentNotFound,
            OmxError::BadParameter,
            OmxError::NotImplemented,
            OmxError::Underflow,
            OmxError::Overflow,
            OmxError::Hardware,
            OmxError::InvalidState,
            OmxError::StreamCorrupt,
            OmxError::PortsNotCompatible,
            OmxError::ResourcesLost,
            OmxError::NoMore,
            OmxError::VersionMismatch,
            OmxError::NotReady,
            OmxError::Timeout,
            OmxError::SameState,
            OmxError::ResourcesPreempted,
            OmxError::IncorrectStateTransition,
            OmxError::IncorrectStateOperation,
            OmxError::UnsupportedSetting,
            OmxError::UnsupportedIndex,
            OmxError::BadPortIndex,
            OmxError::PortUnpopulated,
        ];

        if code == 0 {
            return None;
        }
        Some(
            KNOWN
                .into_iter()
                .find(|e| e.code() == code)
                .unwrap_or(OmxError::Other(code)),
        )
    }

    /// Symbolic name of the code.
    pub fn name(&self) -> &'static str {
        match self {
            OmxError::InsufficientResources => "OMX_ErrorInsufficientResources",
            OmxError::Undefined => "OMX_ErrorUndefined",
            OmxError::InvalidComponentName => "OMX_ErrorInvalidComponentName",
            OmxError::ComponentNotFound => "OMX_ErrorComponentNotFound",
            OmxError::BadParameter => "OMX_ErrorBadParameter",
            OmxError::NotImplemented => "OMX_ErrorNotImplemented",
            OmxError::Underflow => "OMX_ErrorUnderflow",
            OmxError::Overflow => "OMX_ErrorOverflow",
            OmxError::Hardware => "OMX_ErrorHardware",
            OmxError::InvalidState => "OMX_ErrorInvalidState",
            OmxError::StreamCorrupt => "OMX_ErrorStreamCorrupt",
            OmxError::PortsNotCompatible => "OMX_ErrorPortsNotCompatible",
            OmxError::ResourcesLost => "OMX_ErrorResourcesLost",
            OmxError::NoMore => "OMX_ErrorNoMore",
            OmxError::VersionMismatch => "OMX_ErrorVersionMismatch",
            OmxError::NotReady => "OMX_ErrorNotReady",
            OmxError::Timeout => "OMX_ErrorTimeout",
            OmxError::SameState => "OMX_ErrorSameState",
            OmxError::ResourcesPreempted => "OMX_ErrorResourcesPreempted",
            OmxError::IncorrectStateTransition => "OMX_ErrorIncorrectStateTransition",
            OmxError::IncorrectStateOperation => "OMX_ErrorIncorrectStateOperation",
            OmxError::UnsupportedSetting => "OMX_ErrorUnsupportedSetting",
            OmxError::UnsupportedIndex => "OMX_ErrorUnsupportedIndex",
            OmxError::BadPortIndex => "OMX_ErrorBadPortIndex",
            OmxError::PortUnpopulated => "OMX_ErrorPortUnpopulated",
            OmxError::Other(_) => "unknown error",
        }
    }
}

impl fmt::Display for OmxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08x})", self.name(), self.code())
    }
}

impl std::error::Error for OmxError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_lookup() {
        assert_eq!(OmxError::from_code(0), None);
        assert_eq!(
            OmxError::from_code(0x8000_101A),
            Some(OmxError::UnsupportedIndex)
        );
        assert_eq!(
            OmxError::from_code(0x9000_0001),
            Some(OmxError::Other(0x9000_0001))
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            OmxError::InsufficientResources.to_string(),
            "OMX_ErrorInsufficientResources (0x80001000)"
        );
    }
}
