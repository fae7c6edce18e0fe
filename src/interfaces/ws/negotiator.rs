//! OCPP subprotocol negotiation
//!
//! During the upgrade handshake the station advertises the OCPP versions it
//! speaks via `Sec-WebSocket-Protocol`. The negotiator picks the first
//! configured protocol the station also supports; the configured list is
//! ordered by server preference (newest first by default).

/// Picks the subprotocol to confirm in the handshake response.
pub struct SubprotocolNegotiator {
    supported: Vec<String>,
}

impl SubprotocolNegotiator {
    pub fn new(supported: Vec<String>) -> Self {
        Self { supported }
    }

    /// `requested` is the raw comma-separated header value.
    pub fn negotiate(&self, requested: &str) -> Option<&str> {
        let requested: Vec<&str> = requested.split(',').map(str::trim).collect();
        self.supported
            .iter()
            .find(|candidate| requested.iter().any(|r| r == candidate))
            .map(String::as_str)
    }

    pub fn supported(&self) -> &[String] {
        &self.supported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn negotiator() -> SubprotocolNegotiator {
        SubprotocolNegotiator::new(vec!["ocpp2.0.1".into(), "ocpp1.6".into()])
    }

    #[test]
    fn picks_single_match() {
        assert_eq!(negotiator().negotiate("ocpp1.6"), Some("ocpp1.6"));
    }

    #[test]
    fn prefers_server_order_on_multiple_matches() {
        assert_eq!(
            negotiator().negotiate("ocpp1.6, ocpp2.0.1"),
            Some("ocpp2.0.1")
        );
    }

    #[test]
    fn no_mutual_protocol() {
        assert_eq!(negotiator().negotiate("ocpp2.1"), None);
        assert_eq!(negotiator().negotiate(""), None);
    }

    #[test]
    fn handles_whitespace_in_header() {
        assert_eq!(negotiator().negotiate("  ocpp1.6 ,ocpp2.1"), Some("ocpp1.6"));
    }
}
