//! Uncompressed APRS position decoding.
//!
//! Layout after the `!` or `=` marker (fixed columns):
//!
//! ```text
//! 0        8 9        18
//! DDMM.mmN T DDDMM.mmW C
//! ```
//!
//! `T` is the symbol table character, `C` the symbol code. Degrees and
//! minutes are read as separate fixed-width fields. Spaces inside them
//! (position ambiguity) read as zeros. Compressed and Mic-E encodings are
//! not decoded.

use crate::types::Point;

/// Payload markers for a position report without timestamp.
const POSITION_MARKERS: &[u8] = b"!=";

/// Width of `DDMM.mmN`.
const LAT_WIDTH: usize = 8;
/// Width of `DDDMM.mmW`.
const LON_WIDTH: usize = 9;
/// Offset of the symbol table character in the body.
const TABLE_OFFSET: usize = LAT_WIDTH;
/// Offset of the longitude group in the body.
const LON_OFFSET: usize = TABLE_OFFSET + 1;
/// Offset of the symbol code character in the body.
const CODE_OFFSET: usize = LON_OFFSET + LON_WIDTH;

/// Fixes this close to (0, 0) on both axes are encoder failures.
const NULL_ISLAND_EPSILON: f64 = 0.02;

/// Symbol pair reported when the payload carries none.
pub const UNKNOWN_SYMBOL: (char, char) = ('/', '?');

/// Decode latitude/longitude from an uncompressed position payload.
pub fn decode_position(payload: &str) -> Option<Point> {
    let bytes = payload.as_bytes();
    if !POSITION_MARKERS.contains(bytes.first()?) {
        return None;
    }
    let body = trim_leading_spaces(&bytes[1..]);
    if body.len() < LON_OFFSET + LON_WIDTH {
        return None;
    }

    let lat = parse_group(&body[..LAT_WIDTH], 2, b'N', b'S')?;
    let lon = parse_group(&body[LON_OFFSET..LON_OFFSET + LON_WIDTH], 3, b'E', b'W')?;

    if lat.abs() > 90.0 || lon.abs() > 180.0 {
        return None;
    }
    if lat.abs() < NULL_ISLAND_EPSILON && lon.abs() < NULL_ISLAND_EPSILON {
        return None;
    }
    Some(Point::new(lat, lon))
}

/// Read the symbol table and code at their fixed offsets.
///
/// Independent of whether the coordinates decode; falls back to
/// [`UNKNOWN_SYMBOL`] when the payload is too short.
pub fn decode_symbol(payload: &str) -> (char, char) {
    let bytes = payload.as_bytes();
    let body = match bytes.first() {
        Some(b) if POSITION_MARKERS.contains(b) => &bytes[1..],
        _ => bytes,
    };
    let body = trim_leading_spaces(body);
    if body.len() <= CODE_OFFSET {
        return UNKNOWN_SYMBOL;
    }

    let table = body[TABLE_OFFSET];
    let code = body[CODE_OFFSET];
    let table = if is_table_char(table) {
        table as char
    } else {
        UNKNOWN_SYMBOL.0
    };
    let code = if code.is_ascii_graphic() {
        code as char
    } else {
        UNKNOWN_SYMBOL.1
    };
    (table, code)
}

/// Encode a position in the same fixed-width layout (`!` marker).
pub fn format_position(lat: f64, lon: f64, table: char, code: char) -> String {
    format!(
        "!{}{}{}{}",
        format_group(lat, 2, 'N', 'S'),
        table,
        format_group(lon, 3, 'E', 'W'),
        code
    )
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Parse `D..DMM.mmH` where the degree field is `deg_width` digits wide.
fn parse_group(field: &[u8], deg_width: usize, pos: u8, neg: u8) -> Option<f64> {
    let digits: Vec<u8> = field
        .iter()
        .map(|&b| if b == b' ' { b'0' } else { b })
        .collect();

    let (deg, rest) = digits.split_at(deg_width);
    let (minutes, hemisphere) = rest.split_at(5);

    if !deg.iter().all(u8::is_ascii_digit) {
        return None;
    }
    // MM.mm
    if minutes[2] != b'.'
        || !minutes[..2].iter().all(u8::is_ascii_digit)
        || !minutes[3..].iter().all(u8::is_ascii_digit)
    {
        return None;
    }

    let deg: f64 = std::str::from_utf8(deg).ok()?.parse().ok()?;
    let minutes: f64 = std::str::from_utf8(minutes).ok()?.parse().ok()?;
    if minutes >= 60.0 {
        return None;
    }

    let value = deg + minutes / 60.0;
    match hemisphere[0].to_ascii_uppercase() {
        h if h == pos => Some(value),
        h if h == neg => Some(-value),
        _ => None,
    }
}

fn format_group(value: f64, deg_width: usize, pos: char, neg: char) -> String {
    let hemisphere = if value < 0.0 { neg } else { pos };
    let abs = value.abs();
    let mut deg = abs.trunc();
    let mut minutes = ((abs - deg) * 60.0 * 100.0).round() / 100.0;
    if minutes >= 60.0 {
        deg += 1.0;
        minutes = 0.0;
    }
    format!(
        "{:0width$}{:05.2}{}",
        deg as u32,
        minutes,
        hemisphere,
        width = deg_width
    )
}

fn is_table_char(b: u8) -> bool {
    b == b'/' || b == b'\\' || b.is_ascii_uppercase() || b.is_ascii_digit()
}

fn trim_leading_spaces(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().take_while(|&&b| b == b' ').count();
    &bytes[start..]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// One hundredth of a minute, the layout's resolution.
    const RESOLUTION_DEG: f64 = 0.01 / 60.0;

    #[test]
    fn test_decode_north_west() {
        let p = decode_position("!4903.50N/07201.75W-Test 001234").unwrap();
        assert!((p.lat - (49.0 + 3.5 / 60.0)).abs() < 1e-9);
        assert!((p.lon - -(72.0 + 1.75 / 60.0)).abs() < 1e-9);
    }

    #[test]
    fn test_decode_south_east() {
        let p = decode_position("=3352.08S\\15112.45E-").unwrap();
        assert!(p.lat < 0.0);
        assert!(p.lon > 0.0);
        assert!((p.lat + 33.868).abs() < 1e-3);
        assert!((p.lon - 151.2075).abs() < 1e-3);
    }

    #[test]
    fn test_decode_lowercase_hemisphere() {
        assert!(decode_position("!4903.50n/07201.75w-").is_some());
    }

    #[test]
    fn test_decode_overlay_table() {
        let p = decode_position("!4903.50N107201.75W#").unwrap();
        assert!(p.lat > 49.0);
        assert_eq!(decode_symbol("!4903.50N107201.75W#"), ('1', '#'));
    }

    #[test]
    fn test_decode_ambiguity_spaces() {
        let p = decode_position("!4903.  N/07201.  W-").unwrap();
        assert!((p.lat - (49.0 + 3.0 / 60.0)).abs() < 1e-9);
        assert!((p.lon - -(72.0 + 1.0 / 60.0)).abs() < 1e-9);
    }

    #[test]
    fn test_decode_rejects_wrong_marker() {
        assert!(decode_position(">4903.50N/07201.75W-").is_none());
        assert!(decode_position("@092345z4903.50N/07201.75W>").is_none());
        assert!(decode_position("").is_none());
    }

    #[test]
    fn test_decode_rejects_short_and_garbled() {
        assert!(decode_position("!4903.50N/0720").is_none());
        assert!(decode_position("!49X3.50N/07201.75W-").is_none());
        assert!(decode_position("!4903.50Q/07201.75W-").is_none());
        assert!(decode_position("!4903,50N/07201.75W-").is_none());
    }

    #[test]
    fn test_decode_rejects_out_of_range() {
        assert!(decode_position("!9503.50N/07201.75W-").is_none());
        assert!(decode_position("!4903.50N/18201.75W-").is_none());
        assert!(decode_position("!4975.00N/07201.75W-").is_none());
    }

    #[test]
    fn test_decode_rejects_null_island() {
        assert!(decode_position("!0000.00N/00000.00E-").is_none());
        assert!(decode_position("!0000.50N/00000.50W-").is_none());
        // Just outside the epsilon on one axis
        assert!(decode_position("!0000.00N/00002.00E-").is_some());
    }

    #[test]
    fn test_symbol_defaults() {
        assert_eq!(decode_symbol(""), UNKNOWN_SYMBOL);
        assert_eq!(decode_symbol("!4903.50N/07201"), UNKNOWN_SYMBOL);
        assert_eq!(decode_symbol(">status text"), UNKNOWN_SYMBOL);
    }

    #[test]
    fn test_symbol_read_without_valid_position() {
        // Coordinates are garbage but the fixed offsets still hold
        assert_eq!(decode_symbol("!ZZZZZZZZ/ZZZZZZZZZ>"), ('/', '>'));
        assert_eq!(decode_symbol("!4903.50N\\07201.75Wk"), ('\\', 'k'));
    }

    #[test]
    fn test_format_position() {
        assert_eq!(
            format_position(49.058_333_3, -72.029_166_7, '/', '-'),
            "!4903.50N/07201.75W-"
        );
        assert_eq!(format_position(-0.5, 0.5, '/', '>'), "!0030.00S/00030.00E>");
    }

    #[test]
    fn test_decode_stable_within_resolution() {
        let samples = [
            (49.058_3, -72.029_1),
            (35.595_1, -82.551_4),
            (-33.868_8, 151.209_3),
            (64.837_8, -147.716_4),
            (0.5, 0.5),
            (-89.999_9, 179.999_9),
        ];
        for (lat, lon) in samples {
            let text = format_position(lat, lon, '/', '>');
            let p = decode_position(&text).unwrap_or_else(|| panic!("decode {text}"));
            assert!((p.lat - lat).abs() <= RESOLUTION_DEG, "{text}: lat {}", p.lat);
            assert!((p.lon - lon).abs() <= RESOLUTION_DEG, "{text}: lon {}", p.lon);
            // Re-encoding the decoded fix reproduces the same text
            assert_eq!(format_position(p.lat, p.lon, '/', '>'), text);
        }
    }
}
