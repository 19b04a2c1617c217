//! Parse TNC2 text lines into structured APRS frames.
//!
//! Responsibilities:
//! - Split `SRC>DEST,PATH1,PATH2:payload` into source, path, and payload
//! - Strip the digipeated marker (`*`) from path tokens
//! - Tell real stations apart from network infrastructure tokens
//!   (`WIDEn-N`, `TCPIP`, q-constructs, ...)

use crate::position;
use crate::types::Point;

/// Path tokens that never name a physical station.
const NON_STATION_TOKENS: &[&str] = &[
    "APRS", "TCPIP", "TCPXX", "RELAY", "GATE", "WIDE", "QAR", "QAO", "QAS",
];

/// Prefixes of generic relay aliases (`WIDE1-1`, `RELAY`, `GATE`).
const RELAY_PREFIXES: &[&str] = &["WIDE", "RELAY", "GATE"];

/// Marker appended to a path token by a digipeater that relayed the frame.
const DIGIPEATED_MARKER: char = '*';

// ---------------------------------------------------------------------------
// ParsedFrame
// ---------------------------------------------------------------------------

/// A decoded TNC2 envelope. Derived from a stored line, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFrame {
    /// Originating station callsign.
    pub source: String,
    /// Every comma-separated token after `>`, destination first,
    /// with digipeated markers stripped.
    pub path: Vec<String>,
    /// Everything after the first `:`, trimmed.
    pub payload: String,
}

impl ParsedFrame {
    /// Path tokens that name physical stations (infrastructure removed).
    pub fn relays(&self) -> impl Iterator<Item = &str> {
        self.path
            .iter()
            .map(String::as_str)
            .filter(|t| !is_infrastructure(t))
    }

    /// `[source] + relays`, the hop sequence used for propagation.
    pub fn stations(&self) -> Vec<&str> {
        std::iter::once(self.source.as_str())
            .chain(self.relays())
            .collect()
    }

    /// Position carried by the payload, if it uses the uncompressed layout.
    pub fn position(&self) -> Option<Point> {
        position::decode_position(&self.payload)
    }

    /// Symbol table and code, or the unknown pair when absent.
    pub fn symbol(&self) -> (char, char) {
        position::decode_symbol(&self.payload)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a TNC2 line. Returns `None` for anything without `>` and `:`.
pub fn parse_tnc2(line: &str) -> Option<ParsedFrame> {
    let (header, payload) = line.split_once(':')?;
    let (source, path_part) = header.split_once('>')?;

    let source = source.trim();
    if source.is_empty() {
        return None;
    }

    let path = path_part
        .split(',')
        .map(|t| t.trim().trim_end_matches(DIGIPEATED_MARKER))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    Some(ParsedFrame {
        source: source.to_string(),
        path,
        payload: payload.trim().to_string(),
    })
}

/// True for path tokens that represent the network rather than a station.
pub fn is_infrastructure(token: &str) -> bool {
    if token.len() < 2 {
        return true;
    }
    // q-constructs (qAR, qAC, ...) are lowercase-q by definition
    if token.starts_with('q') {
        return true;
    }
    let base = token.split('-').next().unwrap_or(token).to_ascii_uppercase();
    if NON_STATION_TOKENS.contains(&base.as_str()) {
        return true;
    }
    RELAY_PREFIXES.iter().any(|p| base.starts_with(p))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let f = parse_tnc2("N0CALL-9>APRS,WIDE1-1,WIDE2-1:!4903.50N/07201.75W-test").unwrap();
        assert_eq!(f.source, "N0CALL-9");
        assert_eq!(f.path, vec!["APRS", "WIDE1-1", "WIDE2-1"]);
        assert_eq!(f.payload, "!4903.50N/07201.75W-test");
    }

    #[test]
    fn test_parse_strips_digipeated_marker() {
        let f = parse_tnc2("A>APRS,K4ABC-2*,WIDE2*:>status").unwrap();
        assert_eq!(f.path, vec!["APRS", "K4ABC-2", "WIDE2"]);
    }

    #[test]
    fn test_parse_colon_in_payload() {
        let f = parse_tnc2("A>B::N0CALL   :hello{1").unwrap();
        assert_eq!(f.path, vec!["B"]);
        assert_eq!(f.payload, ":N0CALL   :hello{1");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_tnc2("").is_none());
        assert!(parse_tnc2("no separators here").is_none());
        assert!(parse_tnc2("A-B-C:payload").is_none());
        assert!(parse_tnc2(">APRS:payload").is_none());
    }

    #[test]
    fn test_infrastructure_tokens() {
        for t in ["WIDE1-1", "WIDE2-1", "WIDE", "qAR", "qAC", "TCPIP", "TCPXX", "APRS", "RELAY", "GATE", "X"] {
            assert!(is_infrastructure(t), "{t} should be infrastructure");
        }
        for t in ["RECEIVER", "K4ABC-2", "W1AW", "N5ABC-10"] {
            assert!(!is_infrastructure(t), "{t} should be a station");
        }
    }

    #[test]
    fn test_only_receiver_is_candidate() {
        let f = parse_tnc2("SRC>WIDE1-1,WIDE2-1,qAR,RECEIVER:!4903.50N/07201.75W-").unwrap();
        let relays: Vec<&str> = f.relays().collect();
        assert_eq!(relays, vec!["RECEIVER"]);
        assert_eq!(f.stations(), vec!["SRC", "RECEIVER"]);
    }

    #[test]
    fn test_tcpip_path_keeps_igate() {
        let f = parse_tnc2("A>APRS,TCPIP*,qAC,N5ABC-10:!4903.50N/07201.75W-").unwrap();
        let relays: Vec<&str> = f.relays().collect();
        assert_eq!(relays, vec!["N5ABC-10"]);
    }
}
