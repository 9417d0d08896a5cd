//! Enabling the management API over SSH.

use log::{info, warn};

use super::Dispatcher;
use crate::command::{Command, CommandId, Fields, Record, Route};
use crate::error::{Result, SessionError};
use crate::transport::Transport;

/// External authentication server configured in the AAA snapshot, if any.
fn external_auth_server(aaa: &str) -> Option<&'static str> {
    [
        ("aaa radius-server", "RADIUS"),
        ("aaa tacacs+-server", "TACACS+"),
        ("aaa ldap-server", "LDAP"),
    ]
    .into_iter()
    .find(|(needle, _)| aaa.contains(needle))
    .map(|(_, server)| server)
}

fn http_enabled(services: &[Record]) -> bool {
    services
        .iter()
        .find(|row| row.text("Name").trim() == "http")
        .is_some_and(|row| row.text("Status").trim() == "enabled")
}

/// Commands still needed to serve the API with local authentication.
fn missing_items(aaa: &str, services: &[Record]) -> Vec<CommandId> {
    let mut missing = vec![];
    if !http_enabled(services) {
        missing.push(CommandId::EnableHttpService);
    }
    if !aaa.contains("aaa authentication default") {
        missing.push(CommandId::AaaDefaultLocal);
    }
    if !aaa.contains("aaa authentication http") {
        missing.push(CommandId::AaaHttpLocal);
    }
    missing
}

impl<P: Transport, S: Transport> Dispatcher<P, S> {
    /// Turn on the HTTP service and local authentication for it.
    ///
    /// Refuses when logins are delegated to an external server, since
    /// switching them to local would lock out the existing accounts.
    pub(crate) async fn enable_rest(&mut self) -> Result<()> {
        let result = self.enable_rest_inner().await;
        if let Err(e) = self.secondary.close().await {
            warn!("Closing SSH session to {} failed: {}", self.host, e);
        }
        result
    }

    async fn enable_rest_inner(&mut self) -> Result<()> {
        let aaa = self
            .execute_via(Route::Secondary, &Command::new(CommandId::ShowAaaConfiguration))
            .await?;
        if let Some(server) = external_auth_server(aaa.text()) {
            return Err(SessionError::ExternalAuthentication {
                server: server.to_string(),
            }
            .into());
        }

        let services = self
            .execute_via(Route::Secondary, &Command::new(CommandId::ShowIpService))
            .await?;

        let missing = missing_items(aaa.text(), services.records());
        if missing.is_empty() {
            return Ok(());
        }
        for id in &missing {
            self.execute_via(Route::Secondary, &Command::new(*id)).await?;
        }
        self.execute_via(Route::Secondary, &Command::new(CommandId::WriteMemory))
            .await?;
        info!(
            "Enabled the management API on {} ({} changes saved)",
            self.host,
            missing.len()
        );
        Ok(())
    }
}
