use std::time::Duration;

use serde::Serialize;

use crate::{
    db_types::{ReturnStatus, ShippingLabel},
    spe_api::correlation_api::CorrelationTier,
};

/// Tunables for the reconciliation engine.
#[derive(Debug, Clone)]
pub struct ReconciliationOptions {
    /// Whether events may be matched on the customer's email address when no reference matches
    pub contact_fallback: bool,
    /// Upper bound for every email or label service call
    pub notification_timeout: Duration,
    /// How long a label generation claim is honoured before another attempt may take over
    pub label_lease: Duration,
    /// Staleness window of the settings cache
    pub settings_ttl: Duration,
}

impl Default for ReconciliationOptions {
    fn default() -> Self {
        Self {
            contact_fallback: true,
            notification_timeout: Duration::from_secs(10),
            label_lease: Duration::from_secs(120),
            settings_ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The event changed the state of its aggregate
    Applied,
    /// The aggregate was already in (or past) the state the event asks for
    AlreadyApplied,
    /// The event id is in the processed-event ledger
    Duplicate,
    /// No aggregate could be found for the event
    Unmatched,
    /// The event is authentic but carries nothing to reconcile
    Ignored,
    /// Reconciliation could not complete. Requires manual review.
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::AlreadyApplied => "already_applied",
            Outcome::Duplicate => "duplicate",
            Outcome::Unmatched => "unmatched",
            Outcome::Ignored => "ignored",
            Outcome::Failed => "failed",
        }
    }
}

/// The diagnostics for a single event. This is what the webhook acknowledgment carries back to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub event_id: String,
    pub event_type: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<CorrelationTier>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReconciliationReport {
    pub fn new<S1: Into<String>, S2: Into<String>>(event_id: S1, event_type: S2, outcome: Outcome) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            outcome,
            aggregate: None,
            correlation: None,
            warnings: Vec::new(),
            error: None,
        }
    }

    /// An authentic event that is acknowledged without being reconciled.
    pub fn ignored<S1, S2, S3>(event_id: S1, event_type: S2, reason: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::new(event_id, event_type, Outcome::Ignored).with_warning(reason)
    }

    pub fn with_aggregate<S: Into<String>>(mut self, aggregate: S) -> Self {
        self.aggregate = Some(aggregate.into());
        self
    }

    pub fn with_correlation(mut self, tier: CorrelationTier) -> Self {
        self.correlation = Some(tier);
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_warning<S: Into<String>>(mut self, warning: S) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_error<S: Into<String>>(mut self, error: S) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn add_warnings<I: IntoIterator<Item = String>>(&mut self, warnings: I) {
        self.warnings.extend(warnings);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum LabelOutcome {
    Generated { label: ShippingLabel },
    AlreadyGenerated,
    NotReady { status: ReturnStatus },
    /// Another attempt currently holds the label claim for this return
    InProgress,
    /// The label service call failed. The error has been recorded on the return.
    Failed { error: String },
}

/// The result of a label generation attempt, with any non-fatal diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelAttempt {
    #[serde(flatten)]
    pub outcome: LabelOutcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl LabelAttempt {
    pub fn new(outcome: LabelOutcome) -> Self {
        Self { outcome, warnings: Vec::new() }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, LabelOutcome::Failed { .. })
    }
}
