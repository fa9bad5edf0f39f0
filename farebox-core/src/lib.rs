pub mod identity;
pub mod payment;
pub mod repository;

pub use identity::{Actor, Role};
pub use payment::{CashPaymentAdapter, PaymentAdapter};
pub use repository::{BookingRepository, OrderRepository, RepoResult, ScheduleRepository};
