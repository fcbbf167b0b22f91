//! Human-transcribable pairing tokens.
//!
//! A token is eight symbols drawn from an alphabet without the visually
//! ambiguous characters `0 O 1 I`, displayed as two hyphen-separated groups
//! (`AB3D-7XQ2`). Operators read it from one terminal and type it into
//! another, so parsing is forgiving about case and the hyphen.

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;

use super::TokenError;

/// Symbols a token may contain.
pub const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Number of symbols in a token (excluding the separator).
pub const TOKEN_LEN: usize = 8;

/// Symbols per display group.
pub const TOKEN_GROUP_LEN: usize = 4;

/// How many times generation re-reads the random source after a failure.
const MAX_SOURCE_ATTEMPTS: usize = 3;

/// A single-use pairing secret.
///
/// No `Debug` output of the value is provided beyond a redacted form, so a
/// stray `{:?}` in a log line does not leak the credential.
#[derive(Clone, PartialEq, Eq)]
pub struct PairingToken {
    symbols: [u8; TOKEN_LEN],
}

impl PairingToken {
    /// Generate a fresh token from the OS random source.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::RandomSource` if the OS source keeps failing.
    pub fn generate() -> Result<Self, TokenError> {
        Self::generate_with(&mut OsRng)
    }

    /// Generate a token from the given cryptographic RNG.
    ///
    /// Source failures are retried a bounded number of times; there is no
    /// fallback to a weaker generator.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::RandomSource` with the last source error.
    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, TokenError> {
        let mut last_error = String::new();
        for _ in 0..MAX_SOURCE_ATTEMPTS {
            match Self::sample(rng) {
                Ok(symbols) => return Ok(Self { symbols }),
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(TokenError::RandomSource(last_error))
    }

    /// Rejection-sample `TOKEN_LEN` symbols so every symbol is equally likely.
    fn sample<R: RngCore>(rng: &mut R) -> Result<[u8; TOKEN_LEN], rand::Error> {
        let alphabet_len = TOKEN_ALPHABET.len();
        let limit = 256 - (256 % alphabet_len);

        let mut symbols = [0u8; TOKEN_LEN];
        let mut filled = 0;
        let mut buf = [0u8; 16];
        while filled < TOKEN_LEN {
            rng.try_fill_bytes(&mut buf)?;
            for &b in &buf {
                if (b as usize) < limit && filled < TOKEN_LEN {
                    symbols[filled] = TOKEN_ALPHABET[b as usize % alphabet_len];
                    filled += 1;
                }
            }
        }
        Ok(symbols)
    }

    /// Parse an operator-entered token.
    ///
    /// Accepts `AB3D-7XQ2`, `AB3D7XQ2` and their lowercase forms.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::InvalidFormat` for anything else.
    pub fn parse(input: &str) -> Result<Self, TokenError> {
        let trimmed = input.trim();
        let compact: Vec<u8> = match trimmed.split_once('-') {
            Some((head, tail)) if head.len() == TOKEN_GROUP_LEN => {
                head.bytes().chain(tail.bytes()).collect()
            }
            Some(_) => return Err(TokenError::InvalidFormat),
            None => trimmed.bytes().collect(),
        };

        if compact.len() != TOKEN_LEN {
            return Err(TokenError::InvalidFormat);
        }

        let mut symbols = [0u8; TOKEN_LEN];
        for (slot, b) in symbols.iter_mut().zip(compact) {
            let upper = b.to_ascii_uppercase();
            if !TOKEN_ALPHABET.contains(&upper) {
                return Err(TokenError::InvalidFormat);
            }
            *slot = upper;
        }
        Ok(Self { symbols })
    }

    /// Check a presented credential against this token.
    ///
    /// Unparseable input never matches. The symbol comparison is
    /// constant-time.
    #[must_use]
    pub fn matches(&self, presented: &str) -> bool {
        match Self::parse(presented) {
            Ok(other) => self.symbols.ct_eq(&other.symbols).into(),
            Err(_) => false,
        }
    }

    /// The display form, `XXXX-XXXX`.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        let (head, tail) = self.symbols.split_at(TOKEN_GROUP_LEN);
        // Every symbol comes from TOKEN_ALPHABET, which is ASCII.
        format!(
            "{}-{}",
            String::from_utf8_lossy(head),
            String::from_utf8_lossy(tail)
        )
    }

    /// The first group only, for log lines that must not carry the secret.
    #[must_use]
    pub fn redacted(&self) -> String {
        format!(
            "{}-****",
            String::from_utf8_lossy(&self.symbols[..TOKEN_GROUP_LEN])
        )
    }
}

impl std::fmt::Display for PairingToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl std::fmt::Debug for PairingToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PairingToken({})", self.redacted())
    }
}

impl std::str::FromStr for PairingToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
