use std::fmt;

use serde::{Deserialize, Serialize};

use super::payloads::{
    AutoConfirmOrdersPayload, AutoProcessOrderPayload, PasswordResetEmailPayload,
    PharmacistAccountEmailPayload, VerificationEmailPayload,
};
use crate::constants::task_types;
use crate::indexing::ProductDocument;
use crate::messaging::{MessagingError, MessagingResult};

/// Task type identifiers as stored in the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    SendVerificationEmail,
    SendPasswordResetEmail,
    SendPharmacistAccountEmail,
    AutoProcessOrder,
    AutoConfirmOrders,
    CreateProduct,
    UpdateProduct,
}

impl TaskType {
    pub const ALL: [TaskType; 7] = [
        Self::SendVerificationEmail,
        Self::SendPasswordResetEmail,
        Self::SendPharmacistAccountEmail,
        Self::AutoProcessOrder,
        Self::AutoConfirmOrders,
        Self::CreateProduct,
        Self::UpdateProduct,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendVerificationEmail => task_types::SEND_VERIFICATION_EMAIL,
            Self::SendPasswordResetEmail => task_types::SEND_PASSWORD_RESET_EMAIL,
            Self::SendPharmacistAccountEmail => task_types::SEND_PHARMACIST_ACCOUNT_EMAIL,
            Self::AutoProcessOrder => task_types::AUTO_PROCESS_ORDER,
            Self::AutoConfirmOrders => task_types::AUTO_CONFIRM_ORDERS,
            Self::CreateProduct => task_types::CREATE_PRODUCT,
            Self::UpdateProduct => task_types::UPDATE_PRODUCT,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|task_type| task_type.as_str() == s)
            .ok_or_else(|| format!("Unknown task type: {s}"))
    }
}

/// Every task the system can schedule, with its payload
///
/// Routing matches on this enum exhaustively, so adding a kind without a
/// handler does not compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    SendVerificationEmail(VerificationEmailPayload),
    SendPasswordResetEmail(PasswordResetEmailPayload),
    SendPharmacistAccountEmail(PharmacistAccountEmailPayload),
    AutoProcessOrder(AutoProcessOrderPayload),
    AutoConfirmOrders(AutoConfirmOrdersPayload),
    CreateProduct(ProductDocument),
    UpdateProduct(ProductDocument),
}

impl TaskKind {
    pub fn task_type(&self) -> TaskType {
        match self {
            Self::SendVerificationEmail(_) => TaskType::SendVerificationEmail,
            Self::SendPasswordResetEmail(_) => TaskType::SendPasswordResetEmail,
            Self::SendPharmacistAccountEmail(_) => TaskType::SendPharmacistAccountEmail,
            Self::AutoProcessOrder(_) => TaskType::AutoProcessOrder,
            Self::AutoConfirmOrders(_) => TaskType::AutoConfirmOrders,
            Self::CreateProduct(_) => TaskType::CreateProduct,
            Self::UpdateProduct(_) => TaskType::UpdateProduct,
        }
    }

    /// Serialize the payload to the broker's opaque byte format
    pub fn encode(&self) -> MessagingResult<Vec<u8>> {
        let bytes = match self {
            Self::SendVerificationEmail(payload) => serde_json::to_vec(payload),
            Self::SendPasswordResetEmail(payload) => serde_json::to_vec(payload),
            Self::SendPharmacistAccountEmail(payload) => serde_json::to_vec(payload),
            Self::AutoProcessOrder(payload) => serde_json::to_vec(payload),
            Self::AutoConfirmOrders(payload) => serde_json::to_vec(payload),
            Self::CreateProduct(document) | Self::UpdateProduct(document) => {
                serde_json::to_vec(document)
            }
        };
        bytes.map_err(|e| MessagingError::message_serialization(e.to_string()))
    }

    /// Rebuild a task from its type string and payload bytes
    pub fn decode(task_type: &str, payload: &[u8]) -> MessagingResult<Self> {
        let task_type: TaskType = task_type
            .parse()
            .map_err(MessagingError::message_deserialization)?;

        let kind = match task_type {
            TaskType::SendVerificationEmail => {
                Self::SendVerificationEmail(serde_json::from_slice(payload)?)
            }
            TaskType::SendPasswordResetEmail => {
                Self::SendPasswordResetEmail(serde_json::from_slice(payload)?)
            }
            TaskType::SendPharmacistAccountEmail => {
                Self::SendPharmacistAccountEmail(serde_json::from_slice(payload)?)
            }
            TaskType::AutoProcessOrder => Self::AutoProcessOrder(serde_json::from_slice(payload)?),
            TaskType::AutoConfirmOrders => {
                Self::AutoConfirmOrders(serde_json::from_slice(payload)?)
            }
            TaskType::CreateProduct => Self::CreateProduct(serde_json::from_slice(payload)?),
            TaskType::UpdateProduct => Self::UpdateProduct(serde_json::from_slice(payload)?),
        };
        Ok(kind)
    }
}
