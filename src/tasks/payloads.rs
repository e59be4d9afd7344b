//! Serializable task arguments
//!
//! Payloads are plain data: identifiers, strings, and timestamps. Handlers
//! re-read anything mutable (order status, stock) from its owner at run time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationEmailPayload {
    pub email: String,
    pub name: String,
    pub verification_link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordResetEmailPayload {
    pub email: String,
    pub name: String,
    pub reset_link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PharmacistAccountEmailPayload {
    pub email: String,
    pub name: String,
    pub pharmacy_name: String,
    pub setup_link: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoProcessOrderPayload {
    pub order_id: Uuid,
}

/// Orders to confirm once their confirmation window has passed
///
/// `scheduled_at` marks when the orders entered `SENT`; an order touched
/// after that instant was handled manually and is left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoConfirmOrdersPayload {
    pub order_ids: Vec<Uuid>,
    pub scheduled_at: DateTime<Utc>,
}

/// Minimal sanity check shared by the email payloads
pub(crate) fn validate_recipient(email: &str) -> Result<(), String> {
    let trimmed = email.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(format!("invalid recipient address: {email:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_validation() {
        assert!(validate_recipient("budi@example.com").is_ok());
        assert!(validate_recipient("").is_err());
        assert!(validate_recipient("@example.com").is_err());
        assert!(validate_recipient("budi@localhost").is_err());
    }
}
