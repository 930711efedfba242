//! Content-derived record identity.
//!
//! A record id is `{platform}-{hash(pageUrl)}-{hash(question|answer)}`.
//! The hash is a 32-bit rolling multiply-and-add checksum, base-36 encoded.
//! It is not cryptographic; the composite key carries enough entropy for
//! deduplication, and determinism across runs is the property that matters:
//! re-extracting the same turn on the same page always yields the same id.

/// 32-bit rolling hash: `h = h*31 + code`, truncated to 32-bit signed, then
/// absolute value, base-36.
pub fn simple_hash(input: &str) -> String {
    let mut hash: i32 = 0;
    for c in input.chars() {
        // (h << 5) - h == h * 31, in wrapping 32-bit arithmetic.
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(c as i32);
    }
    to_base36(hash.unsigned_abs())
}

/// Derive the stable id for a conversation turn.
pub fn record_id(platform: &str, page_url: &str, question: &str, answer: &str) -> String {
    let content_hash = simple_hash(&format!("{}|{}", question, answer));
    let url_hash = simple_hash(page_url);
    format!("{}-{}-{}", platform, url_hash, content_hash)
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}
