pub mod entity;
pub mod merchant;
pub mod transaction;

pub use entity::{Entity, EntityKind};
pub use merchant::{Merchant, MerchantStatus, NewMerchant};
pub use transaction::{NewTransaction, Transaction, TransactionKind, TransactionStatus};
