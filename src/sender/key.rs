use crate::buffer::WindowBounds;
use rand::Rng;

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ123456789";

pub const SUFFIX_LEN: usize = 8;
pub const KEY_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";
pub const KEY_EXTENSION: &str = ".log.gz";

/// Short random string that keeps two windows closing in the same second
/// from writing to the same key.
pub fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

/// `{start}_{end}_{suffix}.log.gz`, timestamps as compact UTC.
pub fn object_key(window: &WindowBounds, suffix: &str) -> String {
    format!(
        "{}_{}_{}{}",
        window.start.format(KEY_TIMESTAMP_FORMAT),
        window.end.format(KEY_TIMESTAMP_FORMAT),
        suffix,
        KEY_EXTENSION
    )
}

pub fn generate_object_key(window: &WindowBounds) -> String {
    object_key(window, &random_suffix())
}
