use std::collections::HashMap;

use cucumber::World;
use log::*;
use payment_engine::{
    test_utils::{
        fakes::{RecordingEmailSender, ScriptedLabelGenerator},
        faults::FaultyStore,
        prepare_env::{create_database, random_db_path, run_migrations},
    },
    LabelAttempt,
    PaymentEvent,
    ReconciliationApi,
    ReconciliationError,
    ReconciliationOptions,
    ReconciliationReport,
    SqliteDatabase,
};
use tokio::time::sleep;

pub type TestApi = ReconciliationApi<FaultyStore, RecordingEmailSender, ScriptedLabelGenerator>;

#[derive(Default, Debug, World)]
pub struct StorefrontWorld {
    pub system: Option<StorefrontSystem>,
    pub events: HashMap<String, PaymentEvent>,
    pub last_report: Option<ReconciliationReport>,
    pub last_label_attempt: Option<Result<LabelAttempt, ReconciliationError>>,
}

#[derive(Debug)]
pub struct StorefrontSystem {
    pub db_path: String,
    pub api: TestApi,
    pub emails: RecordingEmailSender,
    pub labels: ScriptedLabelGenerator,
}

impl StorefrontWorld {
    pub fn system(&self) -> &StorefrontSystem {
        self.system.as_ref().expect("Storefront system not initialised")
    }

    pub fn api(&self) -> &TestApi {
        &self.system().api
    }

    pub fn db(&self) -> &FaultyStore {
        self.api().db()
    }

    pub fn report(&self) -> &ReconciliationReport {
        self.last_report.as_ref().expect("No event has been reconciled yet")
    }

    pub async fn deliver(&mut self, event: PaymentEvent) {
        let report = self.api().reconcile(&event).await;
        debug!("🚀️ Report for {}: {report:?}", event.id);
        self.events.insert(event.id.clone(), event);
        self.last_report = Some(report);
    }
}

impl StorefrontSystem {
    pub async fn new(options: ReconciliationOptions) -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("🚀️ Created database: {url}");
        sleep(std::time::Duration::from_millis(50)).await;
        let emails = RecordingEmailSender::new();
        let labels = ScriptedLabelGenerator::new();
        let api = ReconciliationApi::new(FaultyStore::new(db), emails.clone(), labels.clone(), options);
        Self { db_path: url, api, emails, labels }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
