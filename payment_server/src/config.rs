use std::{env, net::IpAddr, time::Duration};

use fulfilment_tools::FulfilmentConfig;
use log::*;
use payment_engine::ReconciliationOptions;
use storefront_common::{
    helpers::{env_duration_secs, env_flag},
    Secret,
};

const DEFAULT_SPG_HOST: &str = "127.0.0.1";
const DEFAULT_SPG_PORT: u16 = 8360;
const DEFAULT_SIGNATURE_TOLERANCE: Duration = Duration::from_secs(300);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The shared secret the payment provider signs webhook bodies with.
    pub webhook_secret: Secret<String>,
    /// How far a webhook signature timestamp may drift from our clock before the request is rejected.
    pub signature_tolerance: Duration,
    /// If supplied, requests against the webhook endpoint will be checked against a whitelist of provider IP
    /// addresses. To explicitly disable the whitelist, set this to "false", "none", or "0".
    pub provider_whitelist: Option<Vec<IpAddr>>,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// Bearer key for the `/admin` routes. When empty, the admin routes deny every request.
    pub admin_api_key: Secret<String>,
    pub reconciliation: ReconciliationOptions,
    /// Email and label service configuration
    pub fulfilment: FulfilmentConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SPG_HOST.to_string(),
            port: DEFAULT_SPG_PORT,
            database_url: String::default(),
            webhook_secret: Secret::default(),
            signature_tolerance: DEFAULT_SIGNATURE_TOLERANCE,
            provider_whitelist: None,
            use_x_forwarded_for: false,
            use_forwarded: false,
            admin_api_key: Secret::default(),
            reconciliation: ReconciliationOptions::default(),
            fulfilment: FulfilmentConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SPG_HOST").ok().unwrap_or_else(|| DEFAULT_SPG_HOST.into());
        let port = env::var("SPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for SPG_PORT. {e} Using the default, {DEFAULT_SPG_PORT}, instead."
                    );
                    DEFAULT_SPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_SPG_PORT);
        let database_url = env::var("SPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ SPG_DATABASE_URL is not set. Please set it to the URL for the storefront database.");
            String::default()
        });
        let webhook_secret = env::var("SPG_WEBHOOK_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ SPG_WEBHOOK_SECRET is not set. Every webhook call will be rejected until it is set to the signing \
                 secret of your payment provider endpoint."
            );
            String::default()
        });
        let admin_api_key = env::var("SPG_ADMIN_API_KEY").ok().unwrap_or_else(|| {
            warn!("🪛️ SPG_ADMIN_API_KEY is not set. The admin routes are disabled.");
            String::default()
        });
        let signature_tolerance = duration_from_env("SPG_SIGNATURE_TOLERANCE_SECS", DEFAULT_SIGNATURE_TOLERANCE);
        let provider_whitelist = env::var("SPG_PROVIDER_IP_WHITELIST").ok().and_then(|s| parse_whitelist(&s));
        log_whitelist(&provider_whitelist);
        let use_x_forwarded_for = env_flag("SPG_USE_X_FORWARDED_FOR", false);
        let use_forwarded = env_flag("SPG_USE_FORWARDED", false);
        Self {
            host,
            port,
            database_url,
            webhook_secret: Secret::new(webhook_secret),
            signature_tolerance,
            provider_whitelist,
            use_x_forwarded_for,
            use_forwarded,
            admin_api_key: Secret::new(admin_api_key),
            reconciliation: reconciliation_options_from_env(),
            fulfilment: FulfilmentConfig::new_from_env_or_default(),
        }
    }
}

fn reconciliation_options_from_env() -> ReconciliationOptions {
    let defaults = ReconciliationOptions::default();
    let contact_fallback = env_flag("SPG_CONTACT_FALLBACK", defaults.contact_fallback);
    if !contact_fallback {
        info!("🪛️ Contact fallback is disabled. Events are only matched on metadata and provider references.");
    }
    ReconciliationOptions {
        contact_fallback,
        notification_timeout: duration_from_env("SPG_NOTIFICATION_TIMEOUT_SECS", defaults.notification_timeout),
        label_lease: duration_from_env("SPG_LABEL_LEASE_SECS", defaults.label_lease),
        settings_ttl: duration_from_env("SPG_SETTINGS_TTL_SECS", defaults.settings_ttl),
    }
}

fn duration_from_env(name: &str, default: Duration) -> Duration {
    match env_duration_secs(name) {
        Ok(Some(d)) => d,
        Ok(None) => {
            info!("🪛️ {name} is not set. Using the default value of {}s.", default.as_secs());
            default
        },
        Err(s) => {
            warn!("🪛️ Invalid configuration value for {name}: {s}. Using the default value of {}s.", default.as_secs());
            default
        },
    }
}

/// Parses a comma-separated list of IP addresses. "none", "false" and "0" disable the whitelist.
pub fn parse_whitelist(s: &str) -> Option<Vec<IpAddr>> {
    if ["none", "false", "0"].contains(&s.trim().to_lowercase().as_str()) {
        info!(
            "🪛️ Provider IP whitelist is disabled. If this is not what you want, set SPG_PROVIDER_IP_WHITELIST to a \
             comma-separated list of IP addresses to enable it."
        );
        return None;
    }
    let ip_addrs = s
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            s.parse()
                .map_err(|e| {
                    warn!("🪛️ Ignoring invalid IP address ({s}) in SPG_PROVIDER_IP_WHITELIST: {e}");
                })
                .ok()
        })
        .collect::<Vec<IpAddr>>();
    Some(ip_addrs)
}

fn log_whitelist(whitelist: &Option<Vec<IpAddr>>) {
    match whitelist {
        Some(whitelist) if whitelist.is_empty() => {
            warn!(
                "🚨️ The provider IP whitelist was configured, but is empty. The server will run, but won't accept any \
                 incoming webhook requests."
            );
        },
        None => {
            info!("🪛️ No provider IP whitelist is set. Only signature validation will be used.");
        },
        Some(v) => {
            let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
            info!("🪛️ Provider IP whitelist: {addrs}");
        },
    }
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that is used to configure the server's behaviour. Generally we try to keep this
/// as small as possible, and exclude secrets to avoid passing sensitive information around the system.
#[derive(Clone, Copy, Debug)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded }
    }
}
