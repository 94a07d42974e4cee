use std::sync::OnceLock;

use regex::Regex;

use crate::adapter::Value;

/// Internal Postgres identifier of the `bytea` type.
pub const BYTEA_OID: u32 = 17;
/// Internal Postgres identifier of the `money` type.
pub const MONEY_OID: u32 = 790;

/// Decode one text-format Postgres column value given its type OID, when known.
pub fn decode_text(type_oid: Option<u32>, raw: Option<&str>) -> Value {
    match (type_oid, raw) {
        (_, None) => Value::Null,
        (Some(BYTEA_OID), Some(raw)) => Value::Bytes(unescape_bytea(raw)),
        (Some(MONEY_OID), Some(raw)) => Value::Text(normalize_money(raw)),
        (_, Some(raw)) => Value::Text(raw.to_string()),
    }
}

/// Strip currency symbols and group separators from a locale-formatted
/// money value, leaving a plain decimal with a `.` separator.
///
/// Two output styles occur depending on `lc_monetary`:
/// `$12,345,678.12` and `$12.345.678,12`. Anything else is returned as is.
pub fn normalize_money(raw: &str) -> String {
    static DOT_DECIMAL: OnceLock<Regex> = OnceLock::new();
    static COMMA_DECIMAL: OnceLock<Regex> = OnceLock::new();

    let dot_decimal = DOT_DECIMAL
        .get_or_init(|| Regex::new(r"^-?\D+[\d,]+\.\d{2}$").expect("money pattern is valid"));
    let comma_decimal = COMMA_DECIMAL
        .get_or_init(|| Regex::new(r"^-?\D+[\d.]+,\d{2}$").expect("money pattern is valid"));

    let value = raw.trim();
    if dot_decimal.is_match(value) {
        value
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '.')
            .collect()
    } else if comma_decimal.is_match(value) {
        value
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '-' || *c == ',')
            .map(|c| if c == ',' { '.' } else { c })
            .collect()
    } else {
        raw.to_string()
    }
}

/// Decode a `bytea` value in either hex (`\x4869`) or escape (`H\151`)
/// output format.
pub fn unescape_bytea(raw: &str) -> Vec<u8> {
    if let Some(hex) = raw.strip_prefix("\\x") {
        if let Some(bytes) = decode_hex(hex) {
            return bytes;
        }
    }

    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if bytes.get(i + 1) == Some(&b'\\') {
                out.push(b'\\');
                i += 2;
                continue;
            }
            if let Some(octal) = bytes.get(i + 1..i + 4) {
                if octal.iter().all(|b| (b'0'..=b'7').contains(b)) {
                    let value = octal
                        .iter()
                        .fold(0u16, |acc, digit| acc * 8 + u16::from(digit - b'0'));
                    if let Ok(byte) = u8::try_from(value) {
                        out.push(byte);
                        i += 4;
                        continue;
                    }
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}
