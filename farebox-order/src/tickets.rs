use chrono::Utc;
use farebox_domain::Ticket;
use serde::Serialize;
use uuid::Uuid;

/// Issues the single customer-facing ticket for an order: a human-readable
/// number plus a QR payload that names every seat/passenger pair, so one
/// scan validates the whole order.
pub struct TicketIssuer;

impl TicketIssuer {
    pub fn new() -> Self {
        Self
    }

    pub fn issue(&self, order_id: Uuid, pairs: &[(String, String)]) -> Ticket {
        let number = Self::ticket_number(order_id);
        let seats: Vec<serde_json::Value> = pairs
            .iter()
            .map(|(seat, passenger)| {
                serde_json::json!({ "seat": seat, "passenger": passenger })
            })
            .collect();
        let qr_payload = serde_json::json!({
            "ticket": number,
            "order_id": order_id,
            "seats": seats,
        })
        .to_string();

        Ticket {
            number,
            qr_payload,
            issued_at: Utc::now(),
        }
    }

    /// Format: FBX-{timestamp}-{first 8 hex of the order id, uppercased}
    fn ticket_number(order_id: Uuid) -> String {
        let timestamp = Utc::now().timestamp();
        let short = order_id.simple().to_string()[..8].to_uppercase();
        format!("FBX-{}-{}", timestamp, short)
    }
}

impl Default for TicketIssuer {
    fn default() -> Self {
        Self::new()
    }
}

/// What a gate scanner validates against: the ticket number plus the pairs
/// still active in the order. Cancelled seats drop out of the manifest while
/// the ticket itself is never reissued.
#[derive(Debug, Serialize)]
pub struct TicketManifest {
    pub order_id: Uuid,
    pub ticket_number: String,
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize)]
pub struct ManifestEntry {
    pub seat_number: String,
    pub passenger: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_number_has_the_expected_shape() {
        let issuer = TicketIssuer::new();
        let order_id = Uuid::new_v4();
        let ticket = issuer.issue(order_id, &[("A1".to_string(), "Ada".to_string())]);

        assert!(ticket.number.starts_with("FBX-"));
        let short = ticket.number.rsplit('-').next().unwrap();
        assert_eq!(short.len(), 8);
    }

    #[test]
    fn qr_payload_names_every_pair() {
        let issuer = TicketIssuer::new();
        let order_id = Uuid::new_v4();
        let pairs = vec![
            ("A1".to_string(), "Ada".to_string()),
            ("A2".to_string(), "Grace".to_string()),
        ];
        let ticket = issuer.issue(order_id, &pairs);

        let payload: serde_json::Value = serde_json::from_str(&ticket.qr_payload).unwrap();
        assert_eq!(payload["ticket"], ticket.number);
        assert_eq!(payload["seats"].as_array().unwrap().len(), 2);
        assert_eq!(payload["seats"][1]["passenger"], "Grace");
    }
}
