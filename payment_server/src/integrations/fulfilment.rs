//! Wires the REST clients from `fulfilment_tools` into the engine's notification traits.
use fulfilment_tools::{
    EmailApi,
    FulfilmentApiError,
    FulfilmentConfig,
    LabelApi,
    LabelItem,
    LabelRequest,
    ReturnAddress,
};
use log::*;
use payment_engine::{
    db_types::{Order, ReturnItem, ReturnRequest, ShippingLabel},
    EmailKind,
    EmailReceipt,
    EmailSender,
    LabelGenerator,
    NotificationError,
};
use serde_json::Value;

#[derive(Clone)]
pub struct FulfilmentEmailer {
    api: EmailApi,
}

impl FulfilmentEmailer {
    pub fn new(config: &FulfilmentConfig) -> Result<Self, FulfilmentApiError> {
        Ok(Self { api: EmailApi::new(config)? })
    }
}

impl EmailSender for FulfilmentEmailer {
    async fn send_email(
        &self,
        kind: EmailKind,
        recipient: &str,
        context: Value,
    ) -> Result<EmailReceipt, NotificationError> {
        let message_id = self.api.send(kind.template(), recipient, context).await.map_err(|e| match e {
            FulfilmentApiError::Rejected(reason) => NotificationError::EmailRejected(reason),
            e => NotificationError::EmailUnavailable(e.to_string()),
        })?;
        Ok(EmailReceipt { message_id })
    }
}

#[derive(Clone)]
pub struct FulfilmentLabeler {
    api: LabelApi,
    return_address: ReturnAddress,
}

impl FulfilmentLabeler {
    pub fn new(config: &FulfilmentConfig) -> Result<Self, FulfilmentApiError> {
        Ok(Self { api: LabelApi::new(config)?, return_address: config.return_address.clone() })
    }
}

impl LabelGenerator for FulfilmentLabeler {
    async fn create_label(
        &self,
        request: &ReturnRequest,
        order: &Order,
        items: &[ReturnItem],
    ) -> Result<ShippingLabel, NotificationError> {
        let label_request = label_request(request, order, items, &self.return_address);
        let label = self.api.create_label(label_request).await.map_err(|e| {
            debug!("🏷️ Courier call for return {} failed. {e}", request.return_id);
            NotificationError::LabelFailed(e.to_string())
        })?;
        Ok(ShippingLabel {
            label_url: label.label_url,
            tracking_number: label.tracking_number,
            tracking_url: label.tracking_url,
            parcel_id: label.parcel_id,
        })
    }
}

/// Builds the courier request for a return parcel. The customer is the sender; the store's return address is the
/// recipient.
pub fn label_request(
    request: &ReturnRequest,
    order: &Order,
    items: &[ReturnItem],
    return_address: &ReturnAddress,
) -> LabelRequest {
    LabelRequest {
        reference: request.return_id.as_str().to_string(),
        order_reference: order.order_id.as_str().to_string(),
        sender_name: request.customer_email.clone(),
        sender_email: request.customer_email.clone(),
        recipient: return_address.clone(),
        items: items
            .iter()
            .map(|i| LabelItem { variant_id: i.variant_id.as_str().to_string(), quantity: i.quantity })
            .collect(),
    }
}
