use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{config::ReturnAddress, FulfilmentApiError};

//--------------------------------------        Email          ---------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct EmailRequest {
    /// The template identifier known to the email service, e.g. `order_confirmation`
    pub template: String,
    pub from: String,
    pub to: String,
    /// Free-form data made available to the template
    pub context: Value,
}

/// The email service answers `{ "success": true, "id": "..." }` or `{ "success": false, "error": "..." }`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailSendResult {
    pub success: bool,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl EmailSendResult {
    /// Collapses the service's success flag into a `Result`, returning the message id on success.
    pub fn into_result(self) -> Result<Option<String>, FulfilmentApiError> {
        if self.success {
            Ok(self.id)
        } else {
            Err(FulfilmentApiError::Rejected(self.error.unwrap_or_else(|| "No reason given".to_string())))
        }
    }
}

//--------------------------------------        Labels         ---------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct LabelItem {
    pub variant_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelRequest {
    /// Our return reference. The courier echoes it on the parcel, which makes reconciling their invoices possible.
    pub reference: String,
    pub order_reference: String,
    pub sender_name: String,
    pub sender_email: String,
    pub recipient: ReturnAddress,
    pub items: Vec<LabelItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CreatedLabel {
    pub label_url: String,
    pub tracking_number: String,
    #[serde(default)]
    pub tracking_url: Option<String>,
    pub parcel_id: String,
}
