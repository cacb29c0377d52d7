//! Configuration validation functions.

use super::Config;

/// Validate the parts of config that would otherwise fail confusingly deep inside a
/// running server: an empty app registry (nothing could ever authenticate), a zero
/// heartbeat interval (every host would immediately look stale to the host cache), and
/// duplicate app ids (the second entry would silently shadow the first).
pub fn validate_config_security(config: &Config) -> anyhow::Result<()> {
    if config.apps.is_empty() {
        anyhow::bail!(
            "no apps configured; at least one `apps[]` entry (id + key) is required \
             so the lobby has something to authenticate against"
        );
    }

    let mut seen = std::collections::HashSet::new();
    for app in &config.apps {
        if app.key.trim().is_empty() {
            anyhow::bail!("app '{}' has an empty signing key", app.id);
        }
        if !seen.insert(app.id.as_str()) {
            anyhow::bail!("duplicate app id '{}' in config", app.id);
        }
    }

    if config.heartbeat_interval_secs == 0 {
        anyhow::bail!("heartbeat_interval_secs must be greater than zero");
    }

    if config.lobby.valid_heartbeat_secs == 0 {
        anyhow::bail!("lobby.valid_heartbeat_secs must be greater than zero");
    }

    if config.lobby.max_room_num == 0 {
        anyhow::bail!("lobby.max_room_num must be greater than zero");
    }

    if config.room.msg_channel_capacity == 0 {
        anyhow::bail!("room.msg_channel_capacity must be greater than zero");
    }

    Ok(())
}

/// Detect if we're running in production mode, consulted by `main` to decide whether a
/// bare default `apps: []` should be tolerated for a local smoke-test run.
#[must_use]
pub fn is_production_mode() -> bool {
    use std::env;
    env::var("WSNET2_PRODUCTION").is_ok() || env::var("PRODUCTION").is_ok()
}
