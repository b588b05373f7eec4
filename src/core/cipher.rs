//! Toy reversible password transform used by the fictional network.
//!
//! Stored form is `enc:` followed by the plaintext with every ASCII letter
//! shifted forward by the matching letter of the key (a Vigenère shift).
//! Non-letters pass through and do not consume key positions.

pub const PREFIX: &str = "enc:";

fn key_shifts(key: &str) -> Vec<u8> {
    key.bytes()
        .filter(u8::is_ascii_alphabetic)
        .map(|b| b.to_ascii_lowercase() - b'a')
        .collect()
}

fn shift(text: &str, key: &str, forward: bool) -> String {
    let shifts = key_shifts(key);
    if shifts.is_empty() {
        return text.to_string();
    }
    let mut position = 0usize;
    text.chars()
        .map(|c| {
            if !c.is_ascii_alphabetic() {
                return c;
            }
            let base = if c.is_ascii_lowercase() { b'a' } else { b'A' };
            let k = shifts[position % shifts.len()];
            position += 1;
            let offset = c as u8 - base;
            let moved = if forward {
                (offset + k) % 26
            } else {
                (offset + 26 - k) % 26
            };
            (base + moved) as char
        })
        .collect()
}

pub fn is_encoded(stored: &str) -> bool {
    stored.starts_with(PREFIX)
}

pub fn encode(plain: &str, key: &str) -> String {
    format!("{PREFIX}{}", shift(plain, key, true))
}

/// Reverse [`encode`]. Text without the prefix is returned unchanged.
pub fn decode(stored: &str, key: &str) -> String {
    match stored.strip_prefix(PREFIX) {
        Some(body) => shift(body, key, false),
        None => stored.to_string(),
    }
}
