use std::fmt;

use crate::domain::{NewMerchant, NewTransaction, TransactionKind};

pub const EMAIL_MAX_LEN: usize = 254;
pub const EMAIL_LOCAL_MAX_LEN: usize = 64;
pub const MERCHANT_NAME_MAX_LEN: usize = 300;
pub const CUSTOMER_PHONE_MAX_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, format!("{} is required", field)));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("{} must be at most {} characters", field, max_len),
        ));
    }

    Ok(())
}

/// Syntactic check of an addr-spec: `local@domain` with a dotted domain.
pub fn is_valid_email(value: &str) -> bool {
    if value.is_empty() || value.len() > EMAIL_MAX_LEN {
        return false;
    }

    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };

    if local.is_empty() || local.len() > EMAIL_LOCAL_MAX_LEN || domain.contains('@') {
        return false;
    }

    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }

    let local_ok = local
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~.".contains(ch));
    if !local_ok {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    labels.iter().all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
    })
}

pub fn validate_email(field: &'static str, value: &str) -> ValidationResult {
    if !is_valid_email(value) {
        return Err(ValidationError::new(
            field,
            format!("{} is not a valid email address", field.replace('_', " ")),
        ));
    }

    Ok(())
}

/// Structural checks for a payment operation. Runs before any storage call.
pub fn validate_transaction(tx: &NewTransaction) -> ValidationResult {
    if tx.merchant_id.is_nil() {
        return Err(ValidationError::new("merchant_id", "merchant id required"));
    }

    if tx.kind == TransactionKind::Reversal {
        if tx.amount < 0 {
            return Err(ValidationError::new("amount", "amount must not be negative"));
        }
    } else if tx.amount <= 0 {
        return Err(ValidationError::new("amount", "amount must be positive"));
    }

    if tx.status.is_some() {
        return Err(ValidationError::new("status", "status must not be supplied"));
    }

    match (tx.kind, tx.depends_on) {
        (TransactionKind::Authorize, Some(_)) => {
            return Err(ValidationError::new(
                "depends_on",
                "authorize cannot depend on another transaction",
            ));
        }
        (kind, None) if kind != TransactionKind::Authorize => {
            return Err(ValidationError::new(
                "depends_on",
                format!("{} must depend on a parent transaction", kind),
            ));
        }
        _ => {}
    }

    validate_email("customer_email", &tx.customer_email)?;
    validate_max_len("customer_phone", &tx.customer_phone, CUSTOMER_PHONE_MAX_LEN)?;

    Ok(())
}

pub fn validate_merchant(merchant: &NewMerchant) -> ValidationResult {
    let name = sanitize_string(&merchant.name);
    validate_required("name", &name)?;
    validate_max_len("name", &name, MERCHANT_NAME_MAX_LEN)?;
    validate_email("email", &merchant.email)?;

    Ok(())
}
