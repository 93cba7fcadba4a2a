use std::{fmt::Debug, time::Duration};

use chrono::Utc;
use log::*;
use serde_json::{json, Value};

use crate::{
    db_types::{Order, OrderId, PaymentStatus, ReturnId, ReturnRequest, ReturnStatus, ShippingLabel},
    notifications::{DispatchContext, EmailKind, EmailSender, LabelGenerator, NotificationDispatcher},
    spe_api::{
        correlation_api::{Correlated, CorrelationApi, RefundTarget},
        errors::ReconciliationError,
        event_objects::{PaymentDetails, PaymentEvent, PaymentEventKind, RefundDetails},
        inventory_api::InventoryApi,
        reconciliation_objects::{LabelAttempt, LabelOutcome, Outcome, ReconciliationOptions, ReconciliationReport},
        settings_api::SettingsCache,
    },
    traits::{NewProcessedEvent, OrderTransition, ReconciliationDatabase, ReturnTransition},
};

/// `ReconciliationApi` is the reconciliation engine. It takes verified payment events and applies them to orders and
/// return requests, then triggers the stock adjustments and notifications that follow from the change.
///
/// The engine never fails an event outright. [`ReconciliationApi::reconcile`] always produces a
/// [`ReconciliationReport`]; storage failures are reported with [`Outcome::Failed`] and logged as critical, and side
/// effect failures end up as warnings on an otherwise successful report.
pub struct ReconciliationApi<B, E, L> {
    db: B,
    correlation: CorrelationApi<B>,
    inventory: InventoryApi<B>,
    settings: SettingsCache<B>,
    notifier: NotificationDispatcher<E, L>,
    label_lease: Duration,
}

impl<B, E, L> Debug for ReconciliationApi<B, E, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B: Clone, E, L> ReconciliationApi<B, E, L> {
    pub fn new(db: B, email: E, labels: L, options: ReconciliationOptions) -> Self {
        Self {
            correlation: CorrelationApi::new(db.clone(), options.contact_fallback),
            inventory: InventoryApi::new(db.clone()),
            settings: SettingsCache::new(db.clone(), options.settings_ttl),
            notifier: NotificationDispatcher::new(email, labels, options.notification_timeout),
            label_lease: options.label_lease,
            db,
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }

    pub fn settings(&self) -> &SettingsCache<B> {
        &self.settings
    }
}

impl<B, E, L> ReconciliationApi<B, E, L>
where
    B: ReconciliationDatabase,
    E: EmailSender,
    L: LabelGenerator,
{
    /// Reconciles a single event and returns its diagnostics.
    ///
    /// Redeliveries of events in the processed-event ledger are reported as [`Outcome::Duplicate`] without touching
    /// any aggregate. Events for which no aggregate can be found are reported as [`Outcome::Unmatched`].
    pub async fn reconcile(&self, event: &PaymentEvent) -> ReconciliationReport {
        let mut report = ReconciliationReport::new(event.id.clone(), event.event_type(), Outcome::Unmatched);
        debug!("🔄️ Reconciling {} event {} ({})", event.event_type(), event.id, event.provider_type);
        match self.try_reconcile(event, &mut report).await {
            Ok(()) => {
                info!(
                    "🔄️ {} event {} reconciled: {:?} {}",
                    event.event_type(),
                    event.id,
                    report.outcome,
                    report.aggregate.as_deref().unwrap_or("")
                );
            },
            Err(e) => {
                error!(
                    "🔄️ CRITICAL. {} event {} for {} could not be reconciled and requires manual review. {e}",
                    event.event_type(),
                    event.id,
                    report.aggregate.as_deref().unwrap_or("an unknown aggregate")
                );
                report.outcome = Outcome::Failed;
                report.error = Some(e.to_string());
            },
        }
        report
    }

    async fn try_reconcile(
        &self,
        event: &PaymentEvent,
        report: &mut ReconciliationReport,
    ) -> Result<(), ReconciliationError> {
        if let Some(entry) = self.db.fetch_processed_event(&event.id).await? {
            info!(
                "🔄️ Event {} was already reconciled at {} ({}). Ignoring the redelivery.",
                event.id, entry.processed_at, entry.outcome
            );
            report.outcome = Outcome::Duplicate;
            report.aggregate = entry.aggregate;
            return Ok(());
        }
        let complete = match &event.kind {
            PaymentEventKind::PaymentSucceeded(payment) => self.on_payment_succeeded(event, payment, report).await?,
            PaymentEventKind::PaymentFailed(payment) => {
                let transition = OrderTransition::MarkFailed { reason: payment.failure_reason.clone() };
                self.on_payment_closed(event, payment, transition, report).await?
            },
            PaymentEventKind::CheckoutExpired(payment) => {
                self.on_payment_closed(event, payment, OrderTransition::MarkExpired, report).await?
            },
            PaymentEventKind::LabelPaymentSucceeded(payment) => self.on_label_payment(event, payment, report).await?,
            PaymentEventKind::ChargeRefunded(refund) => self.on_refund(event, refund, report).await?,
        };
        if complete && matches!(report.outcome, Outcome::Applied | Outcome::AlreadyApplied) {
            self.record_in_ledger(event, report).await;
        }
        Ok(())
    }

    /// Re-drives label generation for a return, typically after an earlier attempt failed.
    pub async fn generate_return_label(&self, return_id: &ReturnId) -> Result<LabelAttempt, ReconciliationError> {
        let request = self
            .db
            .fetch_return_by_return_id(return_id)
            .await?
            .ok_or_else(|| ReconciliationError::ReturnNotFound(return_id.clone()))?;
        let ctx = DispatchContext::new(format!("admin-{}", Utc::now().timestamp()), aggregate_for_return(return_id));
        info!("🏷️ Label generation for return {return_id} requested by an administrator");
        let attempt = self.generate_label_for(&ctx, &request).await?;
        if let LabelOutcome::NotReady { status } = attempt.outcome {
            return Err(ReconciliationError::LabelNotReady(return_id.clone(), status));
        }
        Ok(attempt)
    }

    //------------------------------------------   Orders   -----------------------------------------------------------

    async fn on_payment_succeeded(
        &self,
        event: &PaymentEvent,
        payment: &PaymentDetails,
        report: &mut ReconciliationReport,
    ) -> Result<bool, ReconciliationError> {
        let Some(correlated) = self.correlation.resolve_order(payment).await? else {
            self.unmatched(event, report);
            return Ok(false);
        };
        let order_id = self.correlated_order(&correlated, report);
        let transition = OrderTransition::MarkPaid {
            payment_ref: payment.payment_ref.clone(),
            payment_method: payment.payment_method.clone(),
            paid_at: event.created_at,
        };
        match self.db.apply_order_transition(&order_id, transition).await? {
            Some(order) => {
                report.outcome = Outcome::Applied;
                info!("🔄️ Order {order_id} has been paid");
                let ctx = DispatchContext::new(event.id.clone(), aggregate_for_order(&order));
                let warnings = self.after_order_paid(&ctx, &order).await;
                report.add_warnings(warnings);
            },
            None => self.order_not_transitioned(event, correlated.aggregate, PaymentStatus::Paid, report).await?,
        }
        Ok(true)
    }

    /// Failed payments and expired checkouts. Neither has any side effects.
    async fn on_payment_closed(
        &self,
        event: &PaymentEvent,
        payment: &PaymentDetails,
        transition: OrderTransition,
        report: &mut ReconciliationReport,
    ) -> Result<bool, ReconciliationError> {
        let Some(correlated) = self.correlation.resolve_order(payment).await? else {
            self.unmatched(event, report);
            return Ok(false);
        };
        let order_id = self.correlated_order(&correlated, report);
        let target = transition.target();
        match self.db.apply_order_transition(&order_id, transition).await? {
            Some(_) => {
                report.outcome = Outcome::Applied;
                info!("🔄️ Order {order_id} payment is now {target}");
            },
            None => self.order_not_transitioned(event, correlated.aggregate, target, report).await?,
        }
        Ok(true)
    }

    async fn after_order_paid(&self, ctx: &DispatchContext, order: &Order) -> Vec<String> {
        let mut warnings = Vec::new();
        let items = self.db.fetch_order_items(&order.order_id).await.unwrap_or_else(|e| {
            error!("🔄️ Could not load line items for order {}. Stock will not be adjusted. {e}", order.order_id);
            warnings.push(format!("line items could not be loaded: {e}"));
            Vec::new()
        });
        let threshold = self.settings.low_stock_threshold().await;
        let lines = items
            .iter()
            .map(|i| {
                json!({
                    "variant_id": i.variant_id,
                    "quantity": i.quantity,
                    "unit_price": i.unit_price.to_string(),
                    "presale": i.presale,
                })
            })
            .collect::<Vec<_>>();
        let context = self
            .email_context(json!({
                "order_id": order.order_id,
                "total_price": order.total_price.to_string(),
                "currency": order.currency,
                "payment_method": order.payment_method,
                "items": lines,
            }))
            .await;
        let (stock, email) = tokio::join!(
            self.inventory.apply_sale(&items, threshold),
            self.notifier.send_email(ctx, EmailKind::OrderConfirmation, &order.customer_email, context)
        );
        warnings.extend(stock.warnings());
        if let Err(e) = email {
            warnings.push(format!("order confirmation email not sent: {e}"));
        }
        warnings
    }

    async fn order_not_transitioned(
        &self,
        event: &PaymentEvent,
        snapshot: Order,
        target: PaymentStatus,
        report: &mut ReconciliationReport,
    ) -> Result<(), ReconciliationError> {
        let order = self.db.fetch_order_by_order_id(&snapshot.order_id).await?.unwrap_or(snapshot);
        report.outcome = Outcome::AlreadyApplied;
        if order.payment_status == target {
            debug!("🔄️ Order {} is already {target}. Nothing to do for event {}", order.order_id, event.id);
        } else {
            let msg = format!("order {} is {} and cannot become {target}", order.order_id, order.payment_status);
            warn!("🔄️ Stale or out-of-order event {}: {msg}", event.id);
            report.warnings.push(msg);
        }
        Ok(())
    }

    fn correlated_order(&self, correlated: &Correlated<Order>, report: &mut ReconciliationReport) -> OrderId {
        report.aggregate = Some(aggregate_for_order(&correlated.aggregate));
        report.correlation = Some(correlated.tier);
        correlated.aggregate.order_id.clone()
    }

    //------------------------------------------   Returns   ----------------------------------------------------------

    async fn on_label_payment(
        &self,
        event: &PaymentEvent,
        payment: &PaymentDetails,
        report: &mut ReconciliationReport,
    ) -> Result<bool, ReconciliationError> {
        let Some(correlated) = self.correlation.resolve_label_return(payment).await? else {
            self.unmatched(event, report);
            return Ok(false);
        };
        let return_id = self.correlated_return(&correlated, report);
        let ctx = DispatchContext::new(event.id.clone(), aggregate_for_return(&return_id));
        let label_payment_ref = payment
            .payment_ref
            .clone()
            .or_else(|| payment.checkout_session_id.clone())
            .unwrap_or_else(|| event.id.clone());
        let transition = ReturnTransition::LabelPaid { label_payment_ref };
        match self.db.apply_return_transition(&return_id, transition).await? {
            Some(request) => {
                report.outcome = Outcome::Applied;
                info!("🔄️ Shipping label for return {return_id} has been paid");
                let context = self
                    .email_context(json!({ "return_id": request.return_id, "order_id": request.order_id }))
                    .await;
                let (email, label) = tokio::join!(
                    self.notifier.send_email(
                        &ctx,
                        EmailKind::LabelPaymentConfirmation,
                        &request.customer_email,
                        context
                    ),
                    self.generate_label_for(&ctx, &request)
                );
                if let Err(e) = email {
                    report.warnings.push(format!("label payment confirmation email not sent: {e}"));
                }
                Ok(self.absorb_label_attempt(&return_id, label, report))
            },
            None => {
                report.outcome = Outcome::AlreadyApplied;
                let current = self.db.fetch_return_by_return_id(&return_id).await?.unwrap_or(correlated.aggregate);
                if current.status == ReturnStatus::ReturnLabelPaymentCompleted && !current.has_label() {
                    info!("🏷️ Return {return_id} was paid for earlier but has no label yet. Retrying label generation.");
                    let label = self.generate_label_for(&ctx, &current).await;
                    return Ok(self.absorb_label_attempt(&return_id, label, report));
                }
                if !current.has_label() {
                    let msg = format!("return {return_id} is {} and cannot accept a label payment", current.status);
                    warn!("🔄️ Stale or out-of-order event {}: {msg}. Requires manual review.", event.id);
                    report.warnings.push(msg);
                }
                Ok(true)
            },
        }
    }

    /// Folds a label attempt into the report. Returns `false` when the attempt failed, so that the event is left out
    /// of the ledger and a redelivery re-drives label generation.
    fn absorb_label_attempt(
        &self,
        return_id: &ReturnId,
        attempt: Result<LabelAttempt, ReconciliationError>,
        report: &mut ReconciliationReport,
    ) -> bool {
        match attempt {
            Ok(attempt) => {
                report.add_warnings(attempt.warnings);
                match attempt.outcome {
                    LabelOutcome::Failed { error } => {
                        report.warnings.push(format!("label generation for return {return_id} failed: {error}"));
                        false
                    },
                    _ => true,
                }
            },
            Err(e) => {
                error!("🏷️ Label generation for return {return_id} could not run. {e}");
                report.warnings.push(format!("label generation for return {return_id} could not run: {e}"));
                false
            },
        }
    }

    /// The label generation sub-procedure.
    ///
    /// Returns that already have a label short-circuit, and returns that are not waiting for a label are reported as
    /// not ready. Otherwise the label claim is taken, so that concurrent deliveries cannot both call the courier, and
    /// the label service is called. A failure is recorded on the return, which stays in
    /// `return_label_payment_completed` for an administrator to re-drive.
    async fn generate_label_for(
        &self,
        ctx: &DispatchContext,
        request: &ReturnRequest,
    ) -> Result<LabelAttempt, ReconciliationError> {
        let return_id = &request.return_id;
        if request.has_label() {
            debug!("🏷️ Return {return_id} already has a label");
            return Ok(LabelAttempt::new(LabelOutcome::AlreadyGenerated));
        }
        if request.status != ReturnStatus::ReturnLabelPaymentCompleted {
            debug!("🏷️ Return {return_id} is {}. It is not ready for a label.", request.status);
            return Ok(LabelAttempt::new(LabelOutcome::NotReady { status: request.status }));
        }
        if !self.db.claim_label_generation(return_id, self.label_lease).await? {
            info!("🏷️ Another label attempt for return {return_id} is already in progress");
            return Ok(LabelAttempt::new(LabelOutcome::InProgress));
        }
        match self.request_label(ctx, request).await {
            Ok(label) => self.store_label(ctx, request, label).await,
            Err(reason) => {
                error!(
                    "🏷️ Label generation for return {return_id} (event {}) failed. The return stays in \
                     return_label_payment_completed and can be re-driven through the admin API. {reason}",
                    ctx.event_id
                );
                if let Err(e) = self.db.record_label_failure(return_id, &reason).await {
                    error!("🏷️ Could not record the label failure on return {return_id}. {e}");
                }
                Ok(LabelAttempt::new(LabelOutcome::Failed { error: reason }))
            },
        }
    }

    async fn request_label(&self, ctx: &DispatchContext, request: &ReturnRequest) -> Result<ShippingLabel, String> {
        let order = match self.db.fetch_order_by_order_id(&request.order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                let e = ReconciliationError::OrderMissingForReturn(request.return_id.clone(), request.order_id.clone());
                return Err(e.to_string());
            },
            Err(e) => return Err(e.to_string()),
        };
        let items = self.db.fetch_return_items(&request.return_id).await.map_err(|e| e.to_string())?;
        self.notifier.create_label(ctx, request, &order, &items).await.map_err(|e| e.to_string())
    }

    async fn store_label(
        &self,
        ctx: &DispatchContext,
        request: &ReturnRequest,
        label: ShippingLabel,
    ) -> Result<LabelAttempt, ReconciliationError> {
        let return_id = &request.return_id;
        let stored = self.db.store_label(return_id, &label).await.map_err(|e| {
            error!(
                "🏷️ CRITICAL. Label {} (parcel {}) was created for return {return_id} but could not be stored. {e}",
                label.tracking_number, label.parcel_id
            );
            e
        })?;
        let Some(updated) = stored else {
            warn!(
                "🏷️ Label {} (parcel {}) was created for return {return_id}, but the return was no longer waiting for \
                 one. The parcel should be voided with the courier.",
                label.tracking_number, label.parcel_id
            );
            let mut attempt = LabelAttempt::new(LabelOutcome::AlreadyGenerated);
            attempt.warnings.push(format!("orphaned label for parcel {}", label.parcel_id));
            return Ok(attempt);
        };
        info!("🏷️ Label {} generated for return {return_id}", label.tracking_number);
        let context = self
            .email_context(json!({
                "return_id": updated.return_id,
                "order_id": updated.order_id,
                "label_url": label.label_url,
                "tracking_number": label.tracking_number,
                "tracking_url": label.tracking_url,
            }))
            .await;
        let email = self.notifier.send_email(ctx, EmailKind::ReturnLabelReady, &updated.customer_email, context).await;
        let mut attempt = LabelAttempt::new(LabelOutcome::Generated { label });
        if let Err(e) = email {
            attempt.warnings.push(format!("return label email not sent: {e}"));
        }
        Ok(attempt)
    }

    fn correlated_return(&self, correlated: &Correlated<ReturnRequest>, report: &mut ReconciliationReport) -> ReturnId {
        report.aggregate = Some(aggregate_for_return(&correlated.aggregate.return_id));
        report.correlation = Some(correlated.tier);
        correlated.aggregate.return_id.clone()
    }

    //------------------------------------------   Refunds   ----------------------------------------------------------

    async fn on_refund(
        &self,
        event: &PaymentEvent,
        refund: &RefundDetails,
        report: &mut ReconciliationReport,
    ) -> Result<bool, ReconciliationError> {
        match self.correlation.resolve_refund(refund).await? {
            None => {
                self.unmatched(event, report);
                Ok(false)
            },
            Some(RefundTarget::Return(correlated)) => self.refund_return(event, refund, correlated, report).await,
            Some(RefundTarget::Order(correlated)) => self.refund_order(event, refund, correlated, report).await,
        }
    }

    async fn refund_return(
        &self,
        event: &PaymentEvent,
        refund: &RefundDetails,
        correlated: Correlated<ReturnRequest>,
        report: &mut ReconciliationReport,
    ) -> Result<bool, ReconciliationError> {
        let return_id = self.correlated_return(&correlated, report);
        let transition =
            ReturnTransition::Refunded { refund_ref: refund.refund_ref.clone(), refunded_at: event.created_at };
        let Some(request) = self.db.apply_return_transition(&return_id, transition).await? else {
            report.outcome = Outcome::AlreadyApplied;
            let current = self.db.fetch_return_by_return_id(&return_id).await?.unwrap_or(correlated.aggregate);
            if current.status != ReturnStatus::Refunded {
                let msg = format!("return {return_id} is {} and cannot be refunded", current.status);
                warn!("🔄️ Refund event {} was not applied: {msg}. Requires manual review.", event.id);
                report.warnings.push(msg);
            }
            return Ok(true);
        };
        report.outcome = Outcome::Applied;
        info!("🔄️ Return {return_id} has been refunded");
        let ctx = DispatchContext::new(event.id.clone(), aggregate_for_return(&return_id));
        let items = self.db.fetch_return_items(&return_id).await.unwrap_or_else(|e| {
            error!("🔄️ Could not load items for return {return_id}. Stock will not be restored. {e}");
            report.warnings.push(format!("return items could not be loaded: {e}"));
            Vec::new()
        });
        let context = self
            .email_context(json!({
                "return_id": request.return_id,
                "order_id": request.order_id,
                "amount_refunded": refund.amount_refunded.map(|a| a.to_string()),
            }))
            .await;
        let (stock, email) = tokio::join!(
            self.inventory.restock(&items),
            self.notifier.send_email(&ctx, EmailKind::RefundProcessed, &request.customer_email, context)
        );
        report.add_warnings(stock.warnings());
        if let Err(e) = email {
            report.warnings.push(format!("refund email not sent: {e}"));
        }
        Ok(true)
    }

    async fn refund_order(
        &self,
        event: &PaymentEvent,
        refund: &RefundDetails,
        correlated: Correlated<Order>,
        report: &mut ReconciliationReport,
    ) -> Result<bool, ReconciliationError> {
        let order_id = self.correlated_order(&correlated, report);
        let transition = OrderTransition::MarkRefunded { refunded_at: event.created_at };
        match self.db.apply_order_transition(&order_id, transition).await? {
            Some(order) => {
                report.outcome = Outcome::Applied;
                info!("🔄️ Order {order_id} has been refunded");
                let ctx = DispatchContext::new(event.id.clone(), aggregate_for_order(&order));
                let context = self
                    .email_context(json!({
                        "order_id": order.order_id,
                        "amount_refunded": refund.amount_refunded.map(|a| a.to_string()),
                        "currency": order.currency,
                    }))
                    .await;
                let email =
                    self.notifier.send_email(&ctx, EmailKind::RefundProcessed, &order.customer_email, context).await;
                if let Err(e) = email {
                    report.warnings.push(format!("refund email not sent: {e}"));
                }
            },
            None => {
                self.order_not_transitioned(event, correlated.aggregate, PaymentStatus::Refunded, report).await?
            },
        }
        Ok(true)
    }

    //------------------------------------------   Helpers   ----------------------------------------------------------

    fn unmatched(&self, event: &PaymentEvent, report: &mut ReconciliationReport) {
        let warning = format!("No order or return matches {} event {}", event.event_type(), event.id);
        warn!("🔗️ {warning}. The event is acknowledged without any changes.");
        report.warnings.push(warning);
        report.outcome = Outcome::Unmatched;
    }

    async fn record_in_ledger(&self, event: &PaymentEvent, report: &mut ReconciliationReport) {
        let entry = NewProcessedEvent {
            event_id: event.id.clone(),
            event_type: event.event_type().to_string(),
            aggregate: report.aggregate.clone(),
            outcome: report.outcome.as_str().to_string(),
            processed_at: Utc::now(),
        };
        match self.db.record_processed_event(entry).await {
            Ok(true) => trace!("🔄️ Event {} recorded in the ledger", event.id),
            Ok(false) => debug!("🔄️ Event {} was recorded in the ledger by a concurrent delivery", event.id),
            Err(e) => {
                warn!("🔄️ Could not record event {} in the ledger. A redelivery will be reconciled again. {e}", event.id);
                report.warnings.push(format!("event not recorded in ledger: {e}"));
            },
        }
    }

    /// The template context shared by every email, merged with `details`.
    async fn email_context(&self, details: Value) -> Value {
        let mut context = json!({
            "store_name": self.settings.store_name().await,
            "support_email": self.settings.support_email().await,
        });
        if let (Value::Object(base), Value::Object(extra)) = (&mut context, details) {
            base.extend(extra);
        }
        context
    }
}

fn aggregate_for_order(order: &Order) -> String {
    format!("order {}", order.order_id)
}

fn aggregate_for_return(return_id: &ReturnId) -> String {
    format!("return {return_id}")
}
