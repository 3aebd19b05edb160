//! Command socket wire format
//!
//! A client sends `"<relay>"` or `"<relay>,<millis>"` as ASCII and receives one
//! reply; the connection is then closed.

use crate::error::{AppError, Result};

/// Reply for any request that reached the engine, whatever the hardware did
pub const REPLY_TOGGLED: &str = "Relay toggled.";
/// Reply for an unparseable request without a duration part
pub const REPLY_INVALID_RELAY: &str = "Invalid relay number.";
/// Reply for an unparseable request carrying a duration part
pub const REPLY_INVALID_RELAY_OR_DURATION: &str = "Invalid relay number or duration.";

/// A parsed trigger request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerRequest {
    pub relay: u32,
    /// `None` when absent or unparseable; the engine applies its default hold
    pub duration_ms: Option<u64>,
}

impl TriggerRequest {
    /// Encode for the wire
    pub fn encode(&self) -> String {
        match self.duration_ms {
            Some(ms) => format!("{},{}", self.relay, ms),
            None => self.relay.to_string(),
        }
    }
}

/// Parse a request line
///
/// Relay numbers must be positive integers. A duration that does not parse
/// is treated as absent.
pub fn parse_request(line: &str) -> Result<TriggerRequest> {
    let line = line.trim();
    let (relay_part, duration_part) = match line.split_once(',') {
        Some((relay, duration)) => (relay.trim(), Some(duration.trim())),
        None => (line, None),
    };

    let relay = relay_part
        .parse::<u32>()
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| AppError::MalformedRequest(line.to_string()))?;

    Ok(TriggerRequest {
        relay,
        duration_ms: duration_part.and_then(|d| d.parse::<u64>().ok()),
    })
}

/// Fixed reply for a request that failed to parse
pub fn malformed_reply(line: &str) -> &'static str {
    if line.contains(',') {
        REPLY_INVALID_RELAY_OR_DURATION
    } else {
        REPLY_INVALID_RELAY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_duration() {
        assert_eq!(
            parse_request("3,150").unwrap(),
            TriggerRequest {
                relay: 3,
                duration_ms: Some(150)
            }
        );
        assert_eq!(parse_request(" 2 , 40 \n").unwrap().duration_ms, Some(40));
    }

    #[test]
    fn test_parse_without_duration() {
        let req = parse_request("3").unwrap();
        assert_eq!(req.relay, 3);
        assert_eq!(req.duration_ms, None);
    }

    #[test]
    fn test_unparseable_duration_is_absent() {
        assert_eq!(parse_request("1,abc").unwrap().duration_ms, None);
        assert_eq!(parse_request("1,").unwrap().duration_ms, None);
        assert_eq!(parse_request("1,-5").unwrap().duration_ms, None);
    }

    #[test]
    fn test_malformed() {
        for line in ["abc", "", "0", "-1", "1.5", "abc,100", ",100"] {
            assert!(
                matches!(parse_request(line), Err(AppError::MalformedRequest(_))),
                "{:?} should be rejected",
                line
            );
        }
        assert_eq!(malformed_reply("abc"), "Invalid relay number.");
        assert_eq!(malformed_reply("abc,100"), "Invalid relay number or duration.");
    }

    #[test]
    fn test_encode() {
        let req = TriggerRequest {
            relay: 2,
            duration_ms: Some(500),
        };
        assert_eq!(req.encode(), "2,500");
        assert_eq!(parse_request(&req.encode()).unwrap(), req);
        assert_eq!(
            TriggerRequest {
                relay: 1,
                duration_ms: None
            }
            .encode(),
            "1"
        );
    }
}
