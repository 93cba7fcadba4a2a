use mockall::mock;
use payment_engine::{
    db_types::{Order, ReturnItem, ReturnRequest, ShippingLabel},
    EmailKind,
    EmailReceipt,
    EmailSender,
    LabelGenerator,
    NotificationError,
};
use serde_json::Value;

mock! {
    pub EmailService {}
    impl EmailSender for EmailService {
        async fn send_email(&self, kind: EmailKind, recipient: &str, context: Value) -> Result<EmailReceipt, NotificationError>;
    }
}

mock! {
    pub LabelService {}
    impl LabelGenerator for LabelService {
        async fn create_label(&self, request: &ReturnRequest, order: &Order, items: &[ReturnItem]) -> Result<ShippingLabel, NotificationError>;
    }
}
