//! `logiq known-hosts list | remove <host>`: manage the SSH trust store.

use anyhow::{Context, Result};

use crate::config::Config;

pub async fn run_list(cfg: &Config) -> Result<()> {
    let store = cfg.known_hosts()?;
    let entries = store.list().context("failed to read known_hosts")?;

    if entries.is_empty() {
        println!("No known hosts in {}.", store.path().display());
        return Ok(());
    }

    println!("{:<32} {}", "HOST", "FINGERPRINT");
    for (host, fingerprint) in &entries {
        println!("{host:<32} {fingerprint}");
    }
    println!("\n{} host(s) in {}.", entries.len(), store.path().display());
    Ok(())
}

/// `host` is the `host:port` key recorded on first connection.
pub async fn run_remove(cfg: &Config, host: &str) -> Result<()> {
    let store = cfg.known_hosts()?;
    let key = if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:{}", logiq_client::DEFAULT_SSH_PORT)
    };

    if store.remove_host(&key).context("failed to update known_hosts")? {
        println!("Removed {key} from {}.", store.path().display());
        Ok(())
    } else {
        anyhow::bail!("{key} is not in {}", store.path().display())
    }
}
