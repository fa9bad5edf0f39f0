pub mod holds;
pub mod ledger;
pub mod memory;

pub use holds::{ActiveHold, HoldManager};
pub use ledger::{HoldStamp, LedgerError, SeatLedger};
pub use memory::MemorySeatLedger;
