use once_cell::sync::Lazy;
use regex::Regex;

/// Bank account format validator. The payout rail only accepts Georgian
/// IBANs today, so the configured pattern is country-specific; swapping
/// the pattern is all it takes to support another rail.
pub struct AccountNumberFormat {
    pattern: Regex,
}

impl AccountNumberFormat {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self { pattern: Regex::new(pattern)? })
    }

    pub fn is_valid(&self, account_number: &str) -> bool {
        self.pattern.is_match(account_number)
    }
}

static GE_IBAN: Lazy<AccountNumberFormat> = Lazy::new(|| {
    AccountNumberFormat::new(r"^GE[0-9]{2}[A-Z]{2}[0-9]{16}$").expect("invalid IBAN pattern")
});

pub fn account_format() -> &'static AccountNumberFormat {
    &GE_IBAN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_account_numbers() {
        assert!(account_format().is_valid("GE29NB0000000101904917"));
        assert!(account_format().is_valid("GE60TB0000000123456789"));
    }

    #[test]
    fn test_invalid_account_numbers() {
        assert!(!account_format().is_valid(""));
        assert!(!account_format().is_valid("GE1234"));
        assert!(!account_format().is_valid("ge29nb0000000101904917"));
        // wrong country prefix
        assert!(!account_format().is_valid("DE29NB0000000101904917"));
        // 23 characters
        assert!(!account_format().is_valid("GE29NB00000001019049170"));
        // trailing garbage must not match
        assert!(!account_format().is_valid("GE29NB0000000101904917 "));
    }

    #[test]
    fn test_custom_pattern() {
        let format = AccountNumberFormat::new(r"^LT[0-9]{18}$").unwrap();
        assert!(format.is_valid("LT121000011101001000"));
        assert!(!format.is_valid("GE29NB0000000101904917"));
    }
}
