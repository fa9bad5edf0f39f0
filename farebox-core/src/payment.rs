use async_trait::async_trait;
use chrono::Utc;
use farebox_domain::payment::{Payment, PaymentMethod, PaymentStatus};
use uuid::Uuid;

/// Seam to the payment collaborator. The engine hands over an amount and a
/// method and reacts only to the status of the record that comes back.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Collect a payment for an order.
    async fn collect(
        &self,
        order_id: Uuid,
        amount_cents: i64,
        method: PaymentMethod,
    ) -> Result<Payment, Box<dyn std::error::Error + Send + Sync>>;

    /// Void a previously collected payment (hold lapsed after payment, or
    /// an admin rolled the order back).
    async fn void(
        &self,
        payment: &Payment,
    ) -> Result<Payment, Box<dyn std::error::Error + Send + Sync>>;
}

/// Counter payments taken by an administrator: settled on the spot, no
/// gateway round trip. Card and mobile payments on the admin path are
/// treated the same way since the money changed hands at the desk.
pub struct CashPaymentAdapter;

#[async_trait]
impl PaymentAdapter for CashPaymentAdapter {
    async fn collect(
        &self,
        order_id: Uuid,
        amount_cents: i64,
        method: PaymentMethod,
    ) -> Result<Payment, Box<dyn std::error::Error + Send + Sync>> {
        let now = Utc::now();
        tracing::info!(%order_id, amount_cents, %method, "recording counter payment");
        Ok(Payment {
            id: Uuid::new_v4(),
            order_id,
            amount_cents,
            method,
            status: PaymentStatus::Completed,
            external_ref: Some(format!("CTR-{}", now.timestamp())),
            created_at: now,
        })
    }

    async fn void(
        &self,
        payment: &Payment,
    ) -> Result<Payment, Box<dyn std::error::Error + Send + Sync>> {
        let mut voided = payment.clone();
        voided.status = PaymentStatus::Refunded;
        tracing::info!(order_id = %payment.order_id, payment_id = %payment.id, "voiding counter payment");
        Ok(voided)
    }
}
