//! Validation for engine request payloads
//!
//! Parsing and bounds checks happen here, before any transaction starts;
//! services can assume well-formed input and concentrate on invariants.

use std::str::FromStr;

use thiserror::Error;

use crate::repos::earning_repo::EarningSource;
use crate::repos::wallet_repo::WalletTxType;

const MAX_NOTE_LEN: usize = 500;
const MAX_REFERENCE_LEN: usize = 100;

/// Validation errors for engine request payloads
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("rate must be between 0 and 100 percent, got {0}")]
    RateOutOfRange(f64),

    #[error("unknown earning source: {0}")]
    UnknownSource(String),

    #[error("unknown wallet transaction type: {0}")]
    UnknownTransactionType(String),

    #[error("reference must be 1-100 characters, got {0}")]
    InvalidReferenceLength(usize),

    #[error("note exceeds 500 characters, got {0}")]
    NoteTooLong(usize),
}

/// Validate a withdrawal request amount
pub fn validate_withdrawal_amount(amount_minor: i64) -> Result<(), ValidationError> {
    if amount_minor <= 0 {
        return Err(ValidationError::NonPositiveAmount(amount_minor));
    }
    Ok(())
}

/// Parse and validate an earning-event payload
pub fn validate_earning_event(
    source: &str,
    price_minor: i64,
    rate_percent: f64,
) -> Result<EarningSource, ValidationError> {
    let source = EarningSource::from_str(source)
        .map_err(|_| ValidationError::UnknownSource(source.to_string()))?;

    if price_minor <= 0 {
        return Err(ValidationError::NonPositiveAmount(price_minor));
    }

    if !rate_percent.is_finite() || !(0.0..=100.0).contains(&rate_percent) {
        return Err(ValidationError::RateOutOfRange(rate_percent));
    }

    Ok(source)
}

/// Parse and validate a wallet-transaction payload
pub fn validate_wallet_transaction(
    tx_type: &str,
    amount_minor: i64,
    note: Option<&str>,
) -> Result<WalletTxType, ValidationError> {
    let tx_type = WalletTxType::from_str(tx_type)
        .map_err(|_| ValidationError::UnknownTransactionType(tx_type.to_string()))?;

    if amount_minor <= 0 {
        return Err(ValidationError::NonPositiveAmount(amount_minor));
    }

    if let Some(note) = note {
        if note.len() > MAX_NOTE_LEN {
            return Err(ValidationError::NoteTooLong(note.len()));
        }
    }

    Ok(tx_type)
}

/// Validate an operator-supplied payout reference
pub fn validate_payout_reference(reference: &str) -> Result<(), ValidationError> {
    let len = reference.len();
    if len == 0 || len > MAX_REFERENCE_LEN {
        return Err(ValidationError::InvalidReferenceLength(len));
    }
    Ok(())
}

/// Validate operator rejection notes
pub fn validate_admin_notes(notes: &str) -> Result<(), ValidationError> {
    if notes.len() > MAX_NOTE_LEN {
        return Err(ValidationError::NoteTooLong(notes.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_withdrawal_amount_must_be_positive() {
        assert_eq!(
            validate_withdrawal_amount(0),
            Err(ValidationError::NonPositiveAmount(0))
        );
        assert_eq!(
            validate_withdrawal_amount(-50),
            Err(ValidationError::NonPositiveAmount(-50))
        );
        assert!(validate_withdrawal_amount(1).is_ok());
    }

    #[test]
    fn test_earning_event_source_parse() {
        assert_eq!(
            validate_earning_event("data_bundle", 1000, 10.0),
            Ok(EarningSource::DataBundle)
        );
        assert_eq!(
            validate_earning_event("lottery", 1000, 10.0),
            Err(ValidationError::UnknownSource("lottery".to_string()))
        );
    }

    #[test]
    fn test_earning_event_rate_bounds() {
        assert_eq!(
            validate_earning_event("referral", 1000, 100.5),
            Err(ValidationError::RateOutOfRange(100.5))
        );
        assert_eq!(
            validate_earning_event("referral", 1000, -1.0),
            Err(ValidationError::RateOutOfRange(-1.0))
        );
        assert!(validate_earning_event("referral", 1000, 0.0).is_ok());
    }

    #[test]
    fn test_wallet_transaction_type_parse() {
        assert_eq!(
            validate_wallet_transaction("topup", 500, None),
            Ok(WalletTxType::Topup)
        );
        assert_eq!(
            validate_wallet_transaction("gift", 500, None),
            Err(ValidationError::UnknownTransactionType("gift".to_string()))
        );
    }

    #[test]
    fn test_wallet_transaction_note_length() {
        let long_note = "x".repeat(501);
        assert_eq!(
            validate_wallet_transaction("topup", 500, Some(&long_note)),
            Err(ValidationError::NoteTooLong(501))
        );
    }

    #[test]
    fn test_payout_reference_length() {
        assert_eq!(
            validate_payout_reference(""),
            Err(ValidationError::InvalidReferenceLength(0))
        );
        assert_eq!(
            validate_payout_reference(&"x".repeat(101)),
            Err(ValidationError::InvalidReferenceLength(101))
        );
        assert!(validate_payout_reference("MOMO-2024-0001").is_ok());
    }
}
