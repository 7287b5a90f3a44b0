//! Password entry for the CLI.
//!
//! Secrets come from the environment when set, otherwise from an
//! interactive prompt. They are handed to the session as a `StaticSecret`
//! before connecting, so nothing prompts while a session is running.

use anyhow::{Context, Result};
use dialoguer::Password;
use logiq_client::{ConnectTarget, StaticSecret};
use tracing::debug;

pub const PASSWORD_ENV: &str = "LOGIQ_PASSWORD";
pub const ADMIN_PASSWORD_ENV: &str = "LOGIQ_ADMIN_PASSWORD";

/// Login secret for `target`, plus a separate admin secret when asked for.
/// Without one, elevation reuses the login secret.
pub fn secrets_for(target: &ConnectTarget, separate_admin: bool) -> Result<StaticSecret> {
    let password = read_secret(PASSWORD_ENV, &format!("Password for {target}"))?;
    let mut secrets = StaticSecret::new(password);

    let admin = match std::env::var(ADMIN_PASSWORD_ENV) {
        Ok(value) => Some(value),
        Err(_) if separate_admin => Some(prompt(&format!("sudo password on {}", target.host))?),
        Err(_) => None,
    };
    if let Some(admin) = admin {
        secrets = secrets.with_admin(admin);
    }
    Ok(secrets)
}

fn read_secret(env: &str, label: &str) -> Result<String> {
    match std::env::var(env) {
        Ok(value) => {
            debug!(env = %env, "using secret from environment");
            Ok(value)
        }
        Err(_) => prompt(label),
    }
}

fn prompt(label: &str) -> Result<String> {
    Password::new()
        .with_prompt(label)
        .allow_empty_password(true)
        .interact()
        .context("failed to read password")
}
