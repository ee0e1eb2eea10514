use rand::Rng;

use crate::config::JOIN_CODE_LENGTH;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Draws a fresh join code. Uniqueness is decided by the store on insert.
pub fn generate_join_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..JOIN_CODE_LENGTH)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Codes are typed by people; compare them case-insensitively.
pub fn normalize_join_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
