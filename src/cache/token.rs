//! Wire format of the salted entity tag.
//!
//! A token is a 43-character truncated base64 SHA-256 digest with a
//! 5-character salt spliced into it after the 22nd character:
//!
//! ```text
//! "  digest[0..22]  salt[0..5]  digest[22..43]  "
//! 1  22             5           21              1   = 50 bytes on the wire
//! ```
//!
//! Decoding never fails loudly: anything that does not have the exact shape
//! is reported as `None`, which callers treat as "does not match".

use std::fmt;

/// Leading digest characters placed before the salt.
pub const DIGEST_HEAD_LEN: usize = 22;
/// Salt characters.
pub const SALT_LEN: usize = 5;
/// Trailing digest characters placed after the salt.
pub const DIGEST_TAIL_LEN: usize = 21;
/// Length of the truncated base64 digest (the padding `=` is dropped).
pub const DIGEST_LEN: usize = DIGEST_HEAD_LEN + DIGEST_TAIL_LEN;
/// Length of the unquoted token body.
pub const TOKEN_BODY_LEN: usize = DIGEST_LEN + SALT_LEN;
/// Length of the token as it appears in an `ETag` / `If-None-Match` header.
pub const QUOTED_TOKEN_LEN: usize = TOKEN_BODY_LEN + 2;

/// Characters a salt is drawn from: 26 lowercase, 26 uppercase, 10 digits
/// and 30 symbols. `"` is excluded because the token travels quote-wrapped.
pub const SALT_ALPHABET: &[u8; 92] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789`~!@#$%^&*()_+{}|:<>?-=[];',./";

/// A five-character salt drawn from [`SALT_ALPHABET`].
///
/// # Examples
///
/// ```
/// use http304::cache::token::Salt;
///
/// let salt = Salt::new("a1{;Z").unwrap();
/// assert_eq!(salt.as_str(), "a1{;Z");
///
/// assert!(Salt::new("toolong").is_none());
/// assert!(Salt::new("ab\"cd").is_none());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Salt([u8; SALT_LEN]);

impl Salt {
    /// Validates a caller-supplied salt.
    ///
    /// Returns `None` unless `salt` is exactly [`SALT_LEN`] characters, all
    /// taken from [`SALT_ALPHABET`].
    pub fn new(salt: &str) -> Option<Self> {
        let bytes: [u8; SALT_LEN] = salt.as_bytes().try_into().ok()?;
        bytes
            .iter()
            .all(|b| SALT_ALPHABET.contains(b))
            .then_some(Self(bytes))
    }

    /// Draws a fresh salt from the calling thread's `fastrand` generator.
    pub fn random() -> Self {
        Self(std::array::from_fn(|_| {
            SALT_ALPHABET[fastrand::usize(..SALT_ALPHABET.len())]
        }))
    }

    /// Returns the salt as a string slice.
    pub fn as_str(&self) -> &str {
        // Every byte is from SALT_ALPHABET, which is ASCII.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Salt").field(&self.as_str()).finish()
    }
}

/// The pieces of an incoming token, borrowed from the header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedToken<'a> {
    digest_head: &'a str,
    salt: &'a str,
    digest_tail: &'a str,
}

impl<'a> DecodedToken<'a> {
    /// The salt the client echoed back. Not checked against the alphabet; a
    /// foreign salt simply produces a digest that will not match.
    pub fn salt(&self) -> &'a str {
        self.salt
    }

    /// Reassembles the 43-character digest the client presented.
    pub fn digest(&self) -> String {
        [self.digest_head, self.digest_tail].concat()
    }

    /// Compares the presented digest against `computed` without reassembling it.
    pub fn digest_matches(&self, computed: &str) -> bool {
        computed.len() == DIGEST_LEN
            && computed.get(..DIGEST_HEAD_LEN) == Some(self.digest_head)
            && computed.get(DIGEST_HEAD_LEN..) == Some(self.digest_tail)
    }
}

/// Builds the quoted wire token from a salt and a truncated digest.
///
/// `digest` is expected to be [`DIGEST_LEN`] ASCII characters; a longer
/// digest is truncated and a shorter one is spliced as far as it goes.
///
/// # Examples
///
/// ```
/// use http304::cache::token::{self, Salt, QUOTED_TOKEN_LEN};
///
/// let digest = "A".repeat(43);
/// let wire = token::encode(&Salt::new("salt!").unwrap(), &digest);
/// assert_eq!(wire.len(), QUOTED_TOKEN_LEN);
/// assert_eq!(&wire[23..28], "salt!");
/// ```
pub fn encode(salt: &Salt, digest: &str) -> String {
    let digest = digest.get(..DIGEST_LEN).unwrap_or(digest);
    // Base64 digests are ASCII; anything else is split on a char boundary
    // and simply never verifies.
    let split = (0..=DIGEST_HEAD_LEN.min(digest.len()))
        .rev()
        .find(|&at| digest.is_char_boundary(at))
        .unwrap_or(0);
    let (head, tail) = digest.split_at(split);

    let mut wire = String::with_capacity(QUOTED_TOKEN_LEN);
    wire.push('"');
    wire.push_str(head);
    wire.push_str(salt.as_str());
    wire.push_str(tail);
    wire.push('"');
    wire
}

/// Splits a quoted wire token into digest and salt.
///
/// Returns `None` unless `wire` is exactly [`QUOTED_TOKEN_LEN`] ASCII bytes
/// wrapped in double quotes.
pub fn decode(wire: &str) -> Option<DecodedToken<'_>> {
    if wire.len() != QUOTED_TOKEN_LEN || !wire.is_ascii() {
        return None;
    }

    let body = wire.strip_prefix('"')?.strip_suffix('"')?;
    let (digest_head, rest) = body.split_at(DIGEST_HEAD_LEN);
    let (salt, digest_tail) = rest.split_at(SALT_LEN);

    Some(DecodedToken {
        digest_head,
        salt,
        digest_tail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFG";

    #[test]
    fn layout_constants() {
        assert_eq!(DIGEST_LEN, 43);
        assert_eq!(TOKEN_BODY_LEN, 48);
        assert_eq!(QUOTED_TOKEN_LEN, 50);
        assert_eq!(SALT_ALPHABET.len(), 92);
        assert_eq!(SALT_ALPHABET.iter().filter(|b| b.is_ascii_punctuation()).count(), 30);
        assert!(!SALT_ALPHABET.contains(&b'"'));
    }

    #[test]
    fn encode_splices_salt_after_digest_head() {
        let salt = Salt::new("$%^&*").unwrap();
        let wire = encode(&salt, DIGEST);
        assert_eq!(wire.len(), QUOTED_TOKEN_LEN);
        assert_eq!(
            wire,
            "\"0123456789abcdefghijkl$%^&*mnopqrstuvwxyzABCDEFG\""
        );
    }

    #[test]
    fn encode_non_ascii_digest_does_not_panic() {
        // 43 bytes, with byte 22 in the middle of a two-byte char.
        let digest = format!("a{}", "é".repeat(21));
        assert_eq!(digest.len(), DIGEST_LEN);
        let wire = encode(&Salt::new("abcde").unwrap(), &digest);
        assert!(wire.contains("abcde"));
        assert!(decode(&wire).is_none());
    }

    #[test]
    fn decode_extracts_salt_and_digest() {
        let salt = Salt::new("[];',").unwrap();
        let wire = encode(&salt, DIGEST);
        let decoded = decode(&wire).unwrap();
        assert_eq!(decoded.salt(), "[];',");
        assert_eq!(decoded.digest(), DIGEST);
        assert!(decoded.digest_matches(DIGEST));
        assert!(!decoded.digest_matches(&DIGEST.replace('0', "1")));
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let wire = encode(&Salt::new("abcde").unwrap(), DIGEST);
        assert!(decode(&wire[..49]).is_none());
        assert!(decode(&format!("{wire} ")).is_none());
        assert!(decode("").is_none());
        assert!(decode(&format!("W/{wire}")).is_none());
    }

    #[test]
    fn decode_requires_quotes() {
        let body = format!("x{}x", &"y".repeat(TOKEN_BODY_LEN));
        assert_eq!(body.len(), QUOTED_TOKEN_LEN);
        assert!(decode(&body).is_none());
    }

    #[test]
    fn decode_rejects_non_ascii_without_panicking() {
        // 48 bytes of body, but the multi-byte char straddles the salt boundary.
        let body = format!("{}é{}", "a".repeat(21), "b".repeat(25));
        let wire = format!("\"{body}\"");
        assert_eq!(wire.len(), QUOTED_TOKEN_LEN);
        assert!(decode(&wire).is_none());
    }

    #[test]
    fn salt_validation() {
        assert!(Salt::new("abcde").is_some());
        assert!(Salt::new("`~!@#").is_some());
        assert!(Salt::new("abcd").is_none());
        assert!(Salt::new("abcdef").is_none());
        assert!(Salt::new("abc d").is_none());
        assert!(Salt::new("abc\"d").is_none());
    }

    #[test]
    fn random_salt_stays_in_alphabet() {
        fastrand::seed(42);
        for _ in 0..200 {
            let salt = Salt::random();
            assert_eq!(salt.as_str().len(), SALT_LEN);
            assert!(salt.as_str().bytes().all(|b| SALT_ALPHABET.contains(&b)));
        }
    }
}
