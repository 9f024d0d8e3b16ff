//! String helpers.

use rand::Rng;

use crate::error::{Error, Result};

const KEYSPACE: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A random alphanumeric string of `length` characters.
pub fn random(length: usize) -> Result<String> {
    random_from(length, KEYSPACE)
}

/// A random string drawn from `keyspace`.
pub fn random_from(length: usize, keyspace: &[u8]) -> Result<String> {
    if length == 0 {
        return Err(Error::InvalidArgument("Length must be a positive integer".into()));
    }
    if keyspace.is_empty() {
        return Err(Error::InvalidArgument("Keyspace must not be empty".into()));
    }

    let mut rng = rand::rng();
    Ok((0..length)
        .map(|_| keyspace[rng.random_range(0..keyspace.len())] as char)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_has_requested_length_and_charset() {
        let s = random(64).unwrap();
        assert_eq!(s.len(), 64);
        assert!(s.bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn zero_length_is_rejected() {
        assert!(matches!(random(0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn custom_keyspace() {
        assert_eq!(random_from(5, b"x").unwrap(), "xxxxx");
        assert!(random_from(5, b"").is_err());
    }
}
