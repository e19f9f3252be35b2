pub mod merchant;
pub mod payment;
pub mod retention;

pub use merchant::MerchantService;
pub use payment::PaymentService;
pub use retention::{RetentionSweeper, SweeperHandle};
