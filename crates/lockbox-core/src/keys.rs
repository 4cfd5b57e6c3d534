//! Rules and generation for tag and item-key strings.

use rand::{rngs::OsRng, Rng};

use crate::error::StoreError;

/// Smallest length `random_key` will produce.
pub const MIN_KEY_LEN: usize = 4;
/// Largest length `random_key` will produce.
pub const MAX_KEY_LEN: usize = 64;

/// Generate a random string of `len` characters, each drawn uniformly
/// from the 26 lowercase ASCII letters.
///
/// `len` must lie in `[MIN_KEY_LEN, MAX_KEY_LEN]`; callers exposing key
/// generation publicly are expected to enforce their own tighter bounds
/// before delegating here.
pub fn random_key(len: usize) -> Result<String, StoreError> {
    if !(MIN_KEY_LEN..=MAX_KEY_LEN).contains(&len) {
        return Err(StoreError::InvalidArgument {
            reason: format!("key length {len} outside [{MIN_KEY_LEN}, {MAX_KEY_LEN}]"),
        });
    }

    let mut rng = OsRng;
    Ok((0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect())
}

/// Validate a tag or item key: non-empty and free of whitespace.
/// `what` names the argument in the error message.
pub fn validate_ident(value: &str, what: &str) -> Result<(), StoreError> {
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return Err(StoreError::InvalidArgument {
            reason: format!("{what} must be non-empty and contain no whitespace"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_match_length_and_charset() {
        for len in [MIN_KEY_LEN, 6, 32, MAX_KEY_LEN] {
            let key = random_key(len).expect("generate");
            assert_eq!(key.len(), len);
            assert!(key.chars().all(|c| c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn rejects_out_of_range_lengths() {
        for len in [0, MIN_KEY_LEN - 1, MAX_KEY_LEN + 1] {
            let err = random_key(len).expect_err("should reject");
            assert!(matches!(err, StoreError::InvalidArgument { .. }));
        }
    }

    #[test]
    fn validates_idents() {
        assert!(validate_ident("session", "tag").is_ok());
        assert!(validate_ident("a", "tag").is_ok());

        for bad in ["", " ", "has space", "tab\there", "new\nline"] {
            let err = validate_ident(bad, "tag").expect_err("should reject");
            assert!(matches!(err, StoreError::InvalidArgument { .. }));
        }
    }
}
