//! Thin REST clients for the two outbound collaborators of the payment reconciler:
//!
//! * [`EmailApi`] talks to the transactional email service. Templates live on the service; we only send the template
//!   kind, the recipient and a JSON context.
//! * [`LabelApi`] talks to the courier integration and creates prepaid return labels.
//!
//! Both clients share a [`RestClient`] that carries authentication headers and a bounded request timeout.
mod api;
mod config;
mod data_objects;
mod error;

pub use api::{EmailApi, LabelApi, RestClient};
pub use config::{FulfilmentConfig, ReturnAddress};
pub use data_objects::{CreatedLabel, EmailRequest, EmailSendResult, LabelItem, LabelRequest};
pub use error::FulfilmentApiError;
