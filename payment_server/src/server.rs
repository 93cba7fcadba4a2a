use std::{net::IpAddr, time::Duration};

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use futures::{future::ok, FutureExt};
use log::*;
use payment_engine::{EmailSender, LabelGenerator, ReconciliationApi, ReconciliationDatabase, SqliteDatabase};

use crate::{
    config::{ServerConfig, ServerOptions},
    errors::{AuthError, ServerError, ServerError::AuthenticationError},
    helpers::get_remote_ip,
    integrations::{
        fulfilment::{FulfilmentEmailer, FulfilmentLabeler},
        stripe::EventVerifier,
    },
    middleware::AdminKeyMiddlewareFactory,
    routes::{health, GenerateReturnLabelRoute, PaymentWebhookRoute, UpdateSettingRoute},
};

/// The engine as it is wired up in production.
pub type ServerApi = ReconciliationApi<SqliteDatabase, FulfilmentEmailer, FulfilmentLabeler>;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let emailer =
        FulfilmentEmailer::new(&config.fulfilment).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let labeler =
        FulfilmentLabeler::new(&config.fulfilment).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let api: ServerApi = ReconciliationApi::new(db, emailer, labeler, config.reconciliation.clone());
    let srv = create_server_instance(config, api)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Builds the HTTP server around an engine instance. The engine (and with it the settings cache) is shared by all
/// workers.
pub fn create_server_instance<B, E, L>(
    config: ServerConfig,
    api: ReconciliationApi<B, E, L>,
) -> Result<Server, ServerError>
where
    B: ReconciliationDatabase + Send + Sync + 'static,
    E: EmailSender + Send + Sync + 'static,
    L: LabelGenerator + Send + Sync + 'static,
{
    let api = web::Data::new(api);
    let verifier = web::Data::new(EventVerifier::new(config.webhook_secret.clone(), config.signature_tolerance));
    let options = ServerOptions::from_config(&config);
    let whitelist = config.provider_whitelist.clone();
    let admin_key = config.admin_api_key.clone();
    let srv = HttpServer::new(move || {
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("spg::access_log"))
            .app_data(api.clone())
            .app_data(verifier.clone());
        let whitelist = whitelist.clone();
        let webhook_scope = web::scope("/webhook")
            .wrap_fn(move |req, srv| {
                let peer_ip = get_remote_ip(req.request(), options.use_x_forwarded_for, options.use_forwarded);
                if is_whitelisted(peer_ip, whitelist.as_deref()) {
                    srv.call(req)
                } else {
                    ok(req.error_response(AuthenticationError(AuthError::ForbiddenPeer))).boxed_local()
                }
            })
            .service(PaymentWebhookRoute::<B, E, L>::new());
        let admin_scope = web::scope("/admin")
            .wrap(AdminKeyMiddlewareFactory::new(admin_key.clone()))
            .service(GenerateReturnLabelRoute::<B, E, L>::new())
            .service(UpdateSettingRoute::<B, E, L>::new());
        app.service(health).service(webhook_scope).service(admin_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Whether a webhook from `peer` may be processed. Without a whitelist, every peer is allowed.
pub fn is_whitelisted(peer: Option<IpAddr>, whitelist: Option<&[IpAddr]>) -> bool {
    match (peer, whitelist) {
        (_, None) => true,
        (Some(ip), Some(whitelist)) => {
            let allowed = whitelist.contains(&ip);
            if allowed {
                debug!("💻️ Payment webhook from {ip}");
            } else {
                warn!("💻️ Payment webhook from {ip}, which is not on the whitelist. Denying access.");
            }
            allowed
        },
        (None, Some(_)) => {
            warn!("💻️ No IP address found for the webhook peer. Denying access.");
            false
        },
    }
}
