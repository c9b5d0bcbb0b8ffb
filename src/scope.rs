//! Scope-class derivation.
//!
//! The token is the first six hex digits of the SHA-256 of the component name,
//! prefixed with `s-`. It is a pure function of the name so recompiling a
//! component yields the same token. Two names sharing a hash prefix collide;
//! that is accepted and not mitigated.

use sha2::{Digest, Sha256};

pub const SCOPE_PREFIX: &str = "s-";
const HASH_LEN: usize = 6;

pub fn scope_class(name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}{}", SCOPE_PREFIX, &digest[..HASH_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_name_same_token() {
        assert_eq!(scope_class("button"), scope_class("button"));
    }

    #[test]
    fn test_token_shape() {
        let token = scope_class("card");
        assert_eq!(token.len(), SCOPE_PREFIX.len() + HASH_LEN);
        assert!(token.starts_with("s-"));
        assert!(token[2..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_known_digest() {
        // sha256("") = e3b0c442...
        assert_eq!(scope_class(""), "s-e3b0c4");
    }

    #[test]
    fn test_different_names_differ() {
        assert_ne!(scope_class("header"), scope_class("footer"));
    }
}
