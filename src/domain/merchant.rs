//! Merchant domain entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MerchantStatus {
    Active,
    Inactive,
}

impl MerchantStatus {
    pub fn from_active(active: bool) -> Self {
        if active {
            MerchantStatus::Active
        } else {
            MerchantStatus::Inactive
        }
    }

    pub fn is_active(&self) -> bool {
        *self == MerchantStatus::Active
    }
}

impl fmt::Display for MerchantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MerchantStatus::Active => f.write_str("active"),
            MerchantStatus::Inactive => f.write_str("inactive"),
        }
    }
}

/// Caller input for a new merchant.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewMerchant {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub email: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Domain entity representing a merchant and its running balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Merchant {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub email: String,
    pub status: MerchantStatus,
    /// Approved charges minus approved refunds, in minor units.
    pub total_transaction_sum: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Merchant {
    pub fn from_input(input: NewMerchant) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            email: input.email,
            status: MerchantStatus::from_active(input.active),
            total_transaction_sum: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Adds `delta` to the balance. Returns `None` on overflow, leaving the balance untouched.
    pub fn adjust_balance(&mut self, delta: i64) -> Option<i64> {
        let total = self.total_transaction_sum.checked_add(delta)?;
        self.total_transaction_sum = total;
        self.updated_at = Utc::now();
        Some(total)
    }
}
