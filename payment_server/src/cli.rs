use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 19] = [
        "RUST_LOG",
        "SPG_HOST",
        "SPG_PORT",
        "SPG_DATABASE_URL",
        "SPG_SIGNATURE_TOLERANCE_SECS",
        "SPG_PROVIDER_IP_WHITELIST",
        "SPG_USE_X_FORWARDED_FOR",
        "SPG_USE_FORWARDED",
        "SPG_CONTACT_FALLBACK",
        "SPG_NOTIFICATION_TIMEOUT_SECS",
        "SPG_LABEL_LEASE_SECS",
        "SPG_SETTINGS_TTL_SECS",
        "SPG_EMAIL_API_URL",
        "SPG_EMAIL_FROM",
        "SPG_LABEL_API_URL",
        "SPG_RETURN_ADDRESS_NAME",
        "SPG_RETURN_ADDRESS_CITY",
        "SPG_RETURN_ADDRESS_POSTAL_CODE",
        "SPG_RETURN_ADDRESS_COUNTRY",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
