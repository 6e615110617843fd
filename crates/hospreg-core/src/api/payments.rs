use serde_json::{Map, Value, json};
use tracing::warn;

use super::require;
use crate::client::{ApiClient, ApiRequest};
use crate::envelope::PageRequest;
use crate::error::{ApiError, RawResponse};
use crate::models::{Notice, Page, PaymentOrder, PaymentReceipt, PaymentStatus};

#[derive(Debug, Clone)]
pub struct PaymentQuery {
    pub patient_id: String,
    pub page: PageRequest,
    pub status: Option<PaymentStatus>,
}

impl PaymentQuery {
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            page: PageRequest::default(),
            status: None,
        }
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = PageRequest { page, page_size };
        self
    }

    pub fn status(mut self, status: PaymentStatus) -> Self {
        self.status = Some(status);
        self
    }

    fn to_payload(&self) -> Value {
        let mut params = Map::new();
        params.insert("patientId".into(), json!(self.patient_id));
        params.insert("page".into(), json!(self.page.page));
        params.insert("pageSize".into(), json!(self.page.page_size));
        if let Some(status) = &self.status {
            params.insert("status".into(), json!(status.label()));
        }
        Value::Object(params)
    }
}

fn order_path(order_id: &str, action: &str) -> String {
    format!(
        "/api/payments/{}/{action}",
        urlencoding::encode(order_id.trim())
    )
}

impl ApiClient {
    pub async fn fetch_payment_orders(
        &self,
        query: &PaymentQuery,
    ) -> Result<Page<PaymentOrder>, ApiError> {
        let outcome: Result<Page<PaymentOrder>, ApiError> = async {
            require("patientId", &query.patient_id)?;
            let request = ApiRequest::get("/api/payments").payload(query.to_payload());
            self.call(request, "Failed to load payment orders")
                .await?
                .into_page(query.page)
        }
        .await;
        self.report(outcome, None)
    }

    /// Pay an order. The reply must report the order as paid; any other
    /// status fails with the raw reply attached.
    pub async fn pay_order(&self, order_id: &str) -> Result<PaymentReceipt, ApiError> {
        let outcome: Result<PaymentReceipt, ApiError> = async {
            require("orderId", order_id)?;
            let reply = self
                .call(ApiRequest::post(order_path(order_id, "pay")), "Payment failed")
                .await?;
            let raw = RawResponse {
                status: reply.status,
                body: reply.payload.clone(),
            };
            let receipt: PaymentReceipt = reply.into_typed()?;
            if receipt.status != PaymentStatus::Paid {
                warn!(order_id, status = receipt.status.label(), "Payment not confirmed");
                let message = match receipt.status.label() {
                    "" => "Payment status could not be confirmed".to_string(),
                    label => format!("Payment not confirmed: {label}"),
                };
                return Err(ApiError::business(message, raw));
            }
            Ok(receipt)
        }
        .await;
        self.report(outcome, Some("Payment successful"))
    }

    pub async fn cancel_payment_order(&self, order_id: &str) -> Result<Notice, ApiError> {
        let outcome: Result<Notice, ApiError> = async {
            require("orderId", order_id)?;
            let reply = self
                .call(
                    ApiRequest::post(order_path(order_id, "cancel")),
                    "Failed to cancel payment order",
                )
                .await?;
            Ok(reply.into_notice())
        }
        .await;
        self.report(outcome, Some("Payment order cancelled"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_path_encodes_id() {
        assert_eq!(order_path("ORD 1", "pay"), "/api/payments/ORD%201/pay");
        assert_eq!(order_path("ORD1", "cancel"), "/api/payments/ORD1/cancel");
    }

    #[test]
    fn payment_query_payload() {
        let payload = PaymentQuery::new("PAT0001")
            .status(PaymentStatus::Unpaid)
            .to_payload();
        assert_eq!(
            payload,
            json!({"patientId": "PAT0001", "page": 1, "pageSize": 10, "status": "待缴费"})
        );
    }
}
