//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, etc.) should be expressed as
//! futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus don’t block
//! execution:
//!
//! ```nocompile
//!     async fn my_handler() -> impl Responder {
//!         tokio::time::sleep(Duration::from_secs(5)).await; // <-- Ok. Worker thread will handle other requests here
//!     }
//! ```
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use bytes::Bytes;
use log::*;
use payment_engine::{
    db_types::ReturnId,
    spe_api::settings_api::LOW_STOCK_THRESHOLD,
    EmailSender,
    LabelGenerator,
    LabelOutcome,
    ReconciliationApi,
    ReconciliationDatabase,
};

use crate::{
    acknowledgment::acknowledge,
    data_objects::{JsonResponse, SettingUpdate},
    errors::ServerError,
    integrations::stripe::{EventVerifier, SIGNATURE_HEADER},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------   Webhook  ---------------------------------------------------
route!(payment_webhook => Post "/payments" impl ReconciliationDatabase, EmailSender, LabelGenerator);
/// The payment provider's webhook.
///
/// The body is read as raw bytes, since the signature is calculated over the exact bytes the provider sent. Only a bad
/// signature gets a `400`; every authentic event is acknowledged with a `200`, whatever happens to it downstream. See
/// [`crate::acknowledgment`] for details.
pub async fn payment_webhook<B, E, L>(
    req: HttpRequest,
    body: Bytes,
    verifier: web::Data<EventVerifier>,
    api: web::Data<ReconciliationApi<B, E, L>>,
) -> HttpResponse
where
    B: ReconciliationDatabase,
    E: EmailSender,
    L: LabelGenerator,
{
    trace!("💻️ Received payment webhook ({} bytes)", body.len());
    let signature = req.headers().get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    acknowledge(verifier.get_ref(), api.get_ref(), signature, body.as_ref()).await
}

// ----------------------------------------------   Admin  -----------------------------------------------------
route!(generate_return_label => Post "/returns/{return_id}/label" impl ReconciliationDatabase, EmailSender, LabelGenerator);
/// Re-drives label generation for a return. This is how a return that is stuck in `return_label_payment_completed`
/// after a courier failure gets its label.
///
/// Responds with the label attempt. A label that already exists is not generated again.
/// * `200` if the label was generated, or already existed,
/// * `404` if the return does not exist,
/// * `409` if the return is not awaiting a label, or another attempt is in flight,
/// * `502` if the courier call failed. The error is recorded on the return.
pub async fn generate_return_label<B, E, L>(
    path: web::Path<String>,
    api: web::Data<ReconciliationApi<B, E, L>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    E: EmailSender,
    L: LabelGenerator,
{
    let return_id = ReturnId::new(path.into_inner());
    info!("💻️ Label re-drive requested for return {return_id}");
    let attempt = api.generate_return_label(&return_id).await?;
    let mut response = match attempt.outcome {
        LabelOutcome::Generated { .. } | LabelOutcome::AlreadyGenerated => HttpResponse::Ok(),
        LabelOutcome::InProgress | LabelOutcome::NotReady { .. } => HttpResponse::Conflict(),
        LabelOutcome::Failed { .. } => HttpResponse::BadGateway(),
    };
    Ok(response.json(attempt))
}

route!(update_setting => Put "/settings/{key}" impl ReconciliationDatabase, EmailSender, LabelGenerator);
/// Writes a store setting and drops it from the settings cache, so that the next email picks it up.
pub async fn update_setting<B, E, L>(
    path: web::Path<String>,
    body: web::Json<SettingUpdate>,
    api: web::Data<ReconciliationApi<B, E, L>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    E: EmailSender,
    L: LabelGenerator,
{
    let key = path.into_inner();
    let SettingUpdate { value } = body.into_inner();
    validate_setting(&key, &value)?;
    info!("💻️ Updating setting '{key}'");
    api.settings().set(&key, value.trim()).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Setting '{key}' updated."))))
}

fn validate_setting(key: &str, value: &str) -> Result<(), ServerError> {
    if key.trim().is_empty() {
        return Err(ServerError::InvalidRequestPath("The setting key cannot be empty".into()));
    }
    if value.trim().is_empty() {
        return Err(ServerError::InvalidRequestBody(format!("The value for '{key}' cannot be empty")));
    }
    if key == LOW_STOCK_THRESHOLD && value.trim().parse::<u32>().is_err() {
        return Err(ServerError::InvalidRequestBody(format!("'{value}' is not a valid {LOW_STOCK_THRESHOLD}")));
    }
    Ok(())
}
