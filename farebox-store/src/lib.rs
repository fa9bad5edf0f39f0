pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod memory;
pub mod order_repo;
pub mod pg_ledger;
pub mod schedule_repo;

pub use booking_repo::PgBookingRepository;
pub use database::DbClient;
pub use memory::{MemoryBookingRepository, MemoryOrderRepository, MemoryScheduleRepository};
pub use order_repo::PgOrderRepository;
pub use pg_ledger::PgSeatLedger;
pub use schedule_repo::PgScheduleRepository;
