//! Datagram protocol
//!
//! Requests are ASCII text, optionally padded with whitespace:
//!
//! - `"0"`: startup / presence ping
//! - any other decimal integer: increment amount (`0` spellings such as
//!   `"00"` or `"-0"` are coerced to `1`; negative values pass through)
//!
//! Replies are sent only for non-normal responses and carry the decimal
//! response code. Silence means "normal".

use crate::error::{Error, Result};
use crate::threshold::ResponseCode;

/// Maximum payload read from a single datagram
pub const MAX_DATAGRAM_SIZE: usize = 64;

/// Literal payload of a startup contact
pub const STARTUP_PAYLOAD: &str = "0";

/// A parsed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Device announced itself
    Startup,
    /// Device reports this many new triggers
    Increment(i64),
}

/// Parse a raw datagram payload
///
/// Anything that is not UTF-8 or not an integer is a protocol error; the
/// caller drops those without replying.
pub fn parse_datagram(payload: &[u8]) -> Result<Command> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| Error::protocol(format!("payload is not UTF-8: {}", e)))?;
    let message = text.trim();

    if message == STARTUP_PAYLOAD {
        return Ok(Command::Startup);
    }

    let increment: i64 = message
        .parse()
        .map_err(|_| Error::protocol(format!("'{}' is not an integer", message)))?;

    // Zero spellings other than the startup literal count as one trigger
    if increment == 0 {
        return Ok(Command::Increment(1));
    }

    Ok(Command::Increment(increment))
}

/// Encode the reply for a response code, if one is sent at all
pub fn encode_reply(response: ResponseCode) -> Option<Vec<u8>> {
    if response.is_normal() {
        None
    } else {
        Some(response.code().to_string().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_startup() {
        assert_eq!(parse_datagram(b"0").unwrap(), Command::Startup);
        assert_eq!(parse_datagram(b"  0\r\n").unwrap(), Command::Startup);
    }

    #[test]
    fn integers_are_increments() {
        assert_eq!(parse_datagram(b"3").unwrap(), Command::Increment(3));
        assert_eq!(parse_datagram(b"\t42 ").unwrap(), Command::Increment(42));
        assert_eq!(parse_datagram(b"+7").unwrap(), Command::Increment(7));
    }

    #[test]
    fn other_zero_spellings_are_coerced_to_one() {
        assert_eq!(parse_datagram(b"00").unwrap(), Command::Increment(1));
        assert_eq!(parse_datagram(b"-0").unwrap(), Command::Increment(1));
        assert_eq!(parse_datagram(b"+0").unwrap(), Command::Increment(1));
    }

    #[test]
    fn negative_values_are_accepted() {
        assert_eq!(parse_datagram(b"-4").unwrap(), Command::Increment(-4));
    }

    #[test]
    fn garbage_is_rejected() {
        for payload in [&b"hello"[..], b"", b"   ", b"1.5", b"1 2", b"0x10", &[0xff, 0xfe]] {
            assert!(
                matches!(parse_datagram(payload), Err(Error::Protocol(_))),
                "payload {:?} should be rejected",
                payload
            );
        }
    }

    #[test]
    fn replies_only_for_threshold() {
        assert_eq!(encode_reply(ResponseCode::Normal), None);
        assert_eq!(
            encode_reply(ResponseCode::ThresholdReached),
            Some(b"1".to_vec())
        );
    }
}
