use thiserror::Error;

use crate::{
    db_types::{OrderId, ReturnId, ReturnStatus},
    traits::StoreError,
};

#[derive(Debug, Clone, Error)]
pub enum ReconciliationError {
    #[error("Storage error: {0}")]
    StoreError(#[from] StoreError),
    #[error("Return {0} does not exist")]
    ReturnNotFound(ReturnId),
    #[error("Return {0} belongs to order {1}, which does not exist")]
    OrderMissingForReturn(ReturnId, OrderId),
    #[error("Return {0} is {1}, so a label cannot be generated for it")]
    LabelNotReady(ReturnId, ReturnStatus),
}
