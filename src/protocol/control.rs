//! Text-framed control messages
//!
//! A peer leaves the relay by sending `DISCONNECT`, `DISCONNECT:<networkType>` or
//! `DISCONNECT:<networkType>:<rating>` as the whole datagram.

const DISCONNECT_KEYWORD: &[u8] = b"DISCONNECT";

/// Network type reported when the peer does not declare one
pub const UNKNOWN_NETWORK: &str = "unknown";

/// A parsed disconnect message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectNotice {
    /// Network type label declared by the peer
    pub network_type: String,
    /// Quality rating declared by the peer, if it parsed as a number
    pub rating: Option<u8>,
}

impl DisconnectNotice {
    pub fn new(network_type: impl Into<String>, rating: Option<u8>) -> Self {
        Self {
            network_type: network_type.into(),
            rating,
        }
    }

    /// Recognize a disconnect message, returning `None` for anything else
    pub fn parse(data: &[u8]) -> Option<Self> {
        let rest = data.strip_prefix(DISCONNECT_KEYWORD)?;
        if !rest.is_empty() && rest[0] != b':' && !rest[0].is_ascii_whitespace() {
            return None;
        }

        let text = String::from_utf8_lossy(rest);
        let text = text.trim();
        // Whatever follows the keyword must be a field list
        if !text.is_empty() && !text.starts_with(':') {
            return None;
        }

        let mut fields = text.split(':').skip(1);
        let network_type = match fields.next().map(str::trim) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => UNKNOWN_NETWORK.to_string(),
        };
        let rating = fields.next().and_then(|r| r.trim().parse::<u8>().ok());

        Some(Self {
            network_type,
            rating,
        })
    }

    /// Encode as the datagram a peer sends
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut text = format!("DISCONNECT:{}", self.network_type);
        if let Some(rating) = self.rating {
            text.push_str(&format!(":{}", rating));
        }
        text.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_disconnect() {
        let notice = DisconnectNotice::parse(b"DISCONNECT").unwrap();
        assert_eq!(notice.network_type, UNKNOWN_NETWORK);
        assert_eq!(notice.rating, None);
    }

    #[test]
    fn test_disconnect_with_network_type() {
        let notice = DisconnectNotice::parse(b"DISCONNECT:WiFi").unwrap();
        assert_eq!(notice.network_type, "WiFi");
        assert_eq!(notice.rating, None);
    }

    #[test]
    fn test_disconnect_with_rating() {
        let notice = DisconnectNotice::parse(b"DISCONNECT:Mobile (4G/5G):4\n").unwrap();
        assert_eq!(notice.network_type, "Mobile (4G/5G)");
        assert_eq!(notice.rating, Some(4));
    }

    #[test]
    fn test_non_numeric_rating_is_dropped() {
        let notice = DisconnectNotice::parse(b"DISCONNECT:Ethernet:great").unwrap();
        assert_eq!(notice.network_type, "Ethernet");
        assert_eq!(notice.rating, None);
    }

    #[test]
    fn test_empty_network_type() {
        let notice = DisconnectNotice::parse(b"DISCONNECT:").unwrap();
        assert_eq!(notice.network_type, UNKNOWN_NETWORK);
    }

    #[test]
    fn test_not_a_disconnect() {
        assert!(DisconnectNotice::parse(b"CONNECT").is_none());
        assert!(DisconnectNotice::parse(b"DISCONNECTED").is_none());
        assert!(DisconnectNotice::parse(&[0u8; 24]).is_none());
    }

    #[test]
    fn test_encode_matches_parse() {
        let notice = DisconnectNotice::new("WiFi", Some(5));
        assert_eq!(notice.to_bytes(), b"DISCONNECT:WiFi:5".to_vec());
        assert_eq!(DisconnectNotice::parse(&notice.to_bytes()), Some(notice));
    }
}
