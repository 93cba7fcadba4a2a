use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use log::{debug, trace};
use regex::Regex;

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The first entry in the `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The first `for=` entry in the `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        result = req.headers().get("X-Forwarded-For").and_then(|v| v.to_str().ok()).and_then(parse_x_forwarded_for);
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        result = req.headers().get("Forwarded").and_then(|v| v.to_str().ok()).and_then(parse_forwarded);
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.peer_addr().map(|a| a.ip());
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr
    })
}

/// The client is the left-most address; proxies append themselves to the right.
fn parse_x_forwarded_for(value: &str) -> Option<IpAddr> {
    value.split(',').next().map(str::trim).and_then(|s| IpAddr::from_str(s).ok())
}

/// Extracts the first `for=` address from a `Forwarded` header, e.g. `for="[2001:db8::1]:4711";proto=https`.
fn parse_forwarded(value: &str) -> Option<IpAddr> {
    let re = Regex::new(r#"(?i)for=(?P<ip>[^;,]+)"#).ok()?;
    let raw = re.captures(value)?.name("ip")?.as_str().trim().trim_matches('"');
    let host = match raw.strip_prefix('[') {
        Some(v6) => v6.split(']').next()?,
        None => raw.split(':').next().filter(|_| raw.matches(':').count() == 1).unwrap_or(raw),
    };
    IpAddr::from_str(host).ok()
}
