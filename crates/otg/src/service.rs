//! Systemd service integration (sd-notify)
//!
//! Every function is a no-op unless `NOTIFY_SOCKET` is set, i.e. when the
//! daemon runs under systemd with `Type=notify`.

use anyhow::{Context, Result};
use std::env;
use std::os::unix::net::UnixDatagram;
use tracing::{debug, info};

fn send(socket_path: &str, message: &str) -> Result<()> {
    let socket = UnixDatagram::unbound().context("Failed to create Unix socket")?;
    socket
        .send_to(message.as_bytes(), socket_path)
        .with_context(|| format!("Failed to send {} to systemd", message))?;
    Ok(())
}

fn notify(message: &str) -> Result<bool> {
    match env::var("NOTIFY_SOCKET") {
        Ok(socket_path) => send(&socket_path, message).map(|()| true),
        Err(_) => {
            debug!("NOTIFY_SOCKET not set, skipping systemd notification");
            Ok(false)
        }
    }
}

/// All device workers are spawned
pub fn notify_ready() -> Result<()> {
    if notify("READY=1")? {
        info!("Notified systemd: service ready");
    }
    Ok(())
}

/// Shutdown has begun
pub fn notify_stopping() -> Result<()> {
    if notify("STOPPING=1")? {
        info!("Notified systemd: service stopping");
    }
    Ok(())
}

/// Shown by `systemctl status`
pub fn notify_status(status: &str) -> Result<()> {
    if notify(&format!("STATUS={}", status))? {
        debug!("Notified systemd: status = {}", status);
    }
    Ok(())
}

pub fn is_systemd() -> bool {
    env::var_os("NOTIFY_SOCKET").is_some()
}
