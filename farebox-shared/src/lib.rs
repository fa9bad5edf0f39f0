pub mod contact;
pub mod pii;

pub use contact::{ContactDetails, PassengerDetails};
pub use pii::Masked;
