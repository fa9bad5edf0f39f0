use serde::{Deserialize, Serialize};

use crate::pii::Masked;

/// Contact data for the person who paid for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub name: String,
    pub phone: Option<Masked<String>>,
    pub email: Option<Masked<String>>,
}

/// Per-passenger data carried on each booking. Admin-created bookings may
/// name passengers that have no account, so everything beyond the name is
/// optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerDetails {
    pub name: String,
    pub phone: Option<Masked<String>>,
    pub email: Option<Masked<String>>,
    pub id_number: Option<Masked<String>>,
}

impl PassengerDetails {
    /// Fall back to the booker's contact data when a passenger was not
    /// named explicitly.
    pub fn from_contact(contact: &ContactDetails) -> Self {
        Self {
            name: contact.name.clone(),
            phone: contact.phone.clone(),
            email: contact.email.clone(),
            id_number: None,
        }
    }
}
