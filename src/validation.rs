use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

use crate::errors::{WalletError, WalletResult};
use crate::keys::MNEMONIC_WORD_COUNT;

const MAX_PASSWORD_LENGTH: usize = 1024;
const MAX_USERNAME_LENGTH: usize = 120;

/// Input validation for the wallet creation surface.
///
/// Password strength policy lives here, at the caller side of the envelope
/// codec: the codec itself accepts any password so that unlock can never be
/// refused on policy grounds.
pub struct InputValidator {
    word_pattern: Regex,
    username_pattern: Regex,
}

impl InputValidator {
    pub fn new() -> WalletResult<Self> {
        let word_pattern = Regex::new(r"^[a-z]+$")
            .map_err(|e| WalletError::ValidationError(format!("Invalid word regex: {}", e)))?;
        let username_pattern = Regex::new(r"^[A-Za-z0-9@._\-]+$").map_err(|e| {
            WalletError::ValidationError(format!("Invalid username regex: {}", e))
        })?;

        Ok(Self {
            word_pattern,
            username_pattern,
        })
    }

    /// Enforce the documented create-time password minimum. Measured on the
    /// trimmed password, matching what the codec will actually derive from.
    pub fn validate_new_password(
        &self,
        password: &SecretString,
        min_length: usize,
    ) -> WalletResult<()> {
        let trimmed_len = password.expose_secret().trim().chars().count();
        if trimmed_len < min_length {
            return Err(WalletError::ValidationError(format!(
                "Password must be at least {} characters",
                min_length
            )));
        }
        if trimmed_len > MAX_PASSWORD_LENGTH {
            return Err(WalletError::ValidationError(
                "Password too long".to_string(),
            ));
        }
        Ok(())
    }

    /// Cheap structural pre-check on an import phrase. Wordlist membership
    /// and the checksum are verified by the key material generator; this
    /// only rejects inputs that cannot possibly be a mnemonic.
    pub fn validate_mnemonic_shape(&self, phrase: &str) -> WalletResult<()> {
        let words: Vec<&str> = phrase.split_whitespace().collect();
        if words.len() != MNEMONIC_WORD_COUNT {
            return Err(WalletError::InvalidMnemonic(format!(
                "expected {} words, got {}",
                MNEMONIC_WORD_COUNT,
                words.len()
            )));
        }

        for word in words {
            if !self.word_pattern.is_match(word) {
                return Err(WalletError::InvalidMnemonic(
                    "phrase contains non-wordlist characters".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Validate a passkey username label.
    pub fn validate_username(&self, username: &str) -> WalletResult<()> {
        let trimmed = username.trim();
        if trimmed.is_empty() {
            return Err(WalletError::ValidationError(
                "Username cannot be empty".to_string(),
            ));
        }
        if trimmed.len() > MAX_USERNAME_LENGTH {
            return Err(WalletError::ValidationError(
                "Username too long".to_string(),
            ));
        }
        if !self.username_pattern.is_match(trimmed) {
            return Err(WalletError::ValidationError(
                "Username contains invalid characters".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new().expect("validator regex patterns are static")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(password: &str) -> SecretString {
        SecretString::from(password.to_string())
    }

    #[test]
    fn password_minimum_applies_to_trimmed_length() {
        let validator = InputValidator::default();
        assert!(validator
            .validate_new_password(&secret("12345678"), 8)
            .is_ok());
        assert!(validator
            .validate_new_password(&secret("1234567"), 8)
            .is_err());
        // Padding whitespace does not count toward the minimum.
        assert!(validator
            .validate_new_password(&secret("  1234567  "), 8)
            .is_err());
    }

    #[test]
    fn mnemonic_shape_rejects_wrong_counts_and_characters() {
        let validator = InputValidator::default();
        let valid_shape = vec!["abandon"; 24].join(" ");
        assert!(validator.validate_mnemonic_shape(&valid_shape).is_ok());

        let short = vec!["abandon"; 23].join(" ");
        assert!(matches!(
            validator.validate_mnemonic_shape(&short),
            Err(WalletError::InvalidMnemonic(_))
        ));

        let mut words = vec!["abandon"; 24];
        words[0] = "Abandon!";
        assert!(matches!(
            validator.validate_mnemonic_shape(&words.join(" ")),
            Err(WalletError::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn username_rules() {
        let validator = InputValidator::default();
        assert!(validator.validate_username("alice@pixswap.com").is_ok());
        assert!(validator.validate_username("  bob-01  ").is_ok());
        assert!(validator.validate_username("").is_err());
        assert!(validator.validate_username("<script>").is_err());
    }
}
