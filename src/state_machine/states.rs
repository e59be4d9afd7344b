use serde::{Deserialize, Serialize};
use std::fmt;

/// Order status definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order placed, waiting for payment proof and pharmacy processing
    Waiting,
    /// Payment accepted, pharmacy is preparing the order
    Processed,
    /// Order handed to the courier
    Sent,
    /// Customer (or the auto-confirm task) confirmed receipt
    Confirmed,
    /// Order was cancelled
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order
    pub const ALL: [OrderStatus; 5] = [
        Self::Waiting,
        Self::Processed,
        Self::Sent,
        Self::Confirmed,
        Self::Cancelled,
    ];

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if the order can still be cancelled from this state
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Waiting | Self::Processed)
    }

    /// Check if the order still expects a payment proof
    pub fn awaits_payment(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Processed => "PROCESSED",
            Self::Sent => "SENT",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WAITING" => Ok(Self::Waiting),
            "PROCESSED" => Ok(Self::Processed),
            "SENT" => Ok(Self::Sent),
            "CONFIRMED" => Ok(Self::Confirmed),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid order status: {s}")),
        }
    }
}

/// Default status for newly placed orders
impl Default for OrderStatus {
    fn default() -> Self {
        Self::Waiting
    }
}
