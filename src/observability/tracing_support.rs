//! Tracing spans for pool lifecycle operations.

use crate::omx::Direction;
use tracing::{Level, Span, span};

/// Create a span for a pool operating on a hardware port.
///
/// # Example
///
/// ```rust,ignore
/// use omxbridge::observability::span_pool;
///
/// let _guard = span_pool("omxh264dec-out", 1, Direction::Output).entered();
/// // start/stop work here...
/// ```
#[inline]
pub fn span_pool(name: &str, port: u32, direction: Direction) -> Span {
    span!(
        Level::DEBUG,
        "pool",
        pool = %name,
        port = port,
        direction = ?direction
    )
}

/// Create a span for applying a negotiated format to a component.
#[inline]
pub fn span_format(component: &str, codec: &str) -> Span {
    span!(Level::DEBUG, "format", component = %component, codec = %codec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_creation() {
        let _span = span_pool("pool", 1, Direction::Output);
        let _guard = span_format("OMX.RENESAS.VIDEO.DECODER.H264", "h264dec").entered();
    }
}
