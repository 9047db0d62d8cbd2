//! Outbound side of the payment collaborator: opening a hosted checkout for
//! a reservation. The inbound side is the callback handled by the lifecycle.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::PaymentConfig;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("payment gateway rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("payment gateway returned malformed data: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub reservation_id: Uuid,
    pub reservation_code: String,
    pub amount: Decimal,
}

/// A checkout opened at the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    pub transaction_id: String,
    pub payment_url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentSession, GatewayError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionBody<'a> {
    amount: Decimal,
    currency: &'a str,
    order_id: &'a str,
    return_url: String,
    cancel_url: String,
    webhook_url: &'a str,
    payment_method: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReply {
    transaction_id: Option<String>,
    payment_url: Option<String>,
}

/// Gateway client speaking the hosted-checkout JSON API.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    config: PaymentConfig,
}

impl HttpPaymentGateway {
    pub fn new(config: PaymentConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentSession, GatewayError> {
        let url = format!(
            "{}/api/v1/transactions",
            self.config.api_url.trim_end_matches('/')
        );
        let frontend = self.config.frontend_base_url.trim_end_matches('/');
        let body = TransactionBody {
            amount: request.amount,
            currency: &self.config.currency,
            order_id: &request.reservation_code,
            return_url: format!("{frontend}/payment/success"),
            cancel_url: format!("{frontend}/payment/cancel"),
            webhook_url: &self.config.webhook_url,
            payment_method: "card",
        };

        debug!(reservation = %request.reservation_code, %url, "Opening gateway checkout");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Payment gateway rejected checkout");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let reply: TransactionReply = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        match (reply.transaction_id, reply.payment_url) {
            (Some(transaction_id), Some(payment_url))
                if !transaction_id.is_empty() && !payment_url.is_empty() =>
            {
                Ok(PaymentSession {
                    transaction_id,
                    payment_url,
                })
            }
            _ => Err(GatewayError::Malformed(
                "reply is missing transactionId or paymentUrl".into(),
            )),
        }
    }
}
