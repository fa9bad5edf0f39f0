pub mod manager;
pub mod reconcile;
pub mod tickets;

pub use manager::{BookingEngine, BookingError, CheckoutReceipt, CreateBookingRequest};
pub use reconcile::{OrphanSummary, ReconciliationService, SweepSummary};
pub use tickets::{TicketIssuer, TicketManifest};
