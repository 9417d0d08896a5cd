//! HTTPS management API transport.

use std::time::Instant;

use log::{debug, info};
use reqwest::{Client, StatusCode};
use serde_json::Value;

use super::config::SwitchConfig;
use super::{Reply, Transport};
use crate::command::Route;
use crate::error::{Error, Result, SessionError, TransportError};

const ACCEPT_JSON: &str = "application/vnd.alcatellucentaos+json";

/// The `result` object every API reply is wrapped in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct Envelope {
    pub diag: Option<u16>,
    pub error: Option<String>,
    pub output: String,
}

impl Envelope {
    pub(crate) fn parse(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body).map_err(|e| {
            crate::error::ParseError::UnexpectedShape(format!("invalid JSON reply: {e}"))
        })?;
        let result = value.get("result").unwrap_or(&value);

        let diag = ["diag", "status"]
            .iter()
            .filter_map(|key| result.get(*key))
            .find_map(|v| match v {
                Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            });

        let error = match result.get("error") {
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            _ => None,
        }
        .filter(|s| !s.is_empty());

        let output = result
            .get("output")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            diag,
            error,
            output,
        })
    }

    fn is_auth_failure(&self) -> bool {
        self.diag == Some(401)
            || self.error.as_deref().is_some_and(|e| {
                let e = e.to_ascii_lowercase();
                e.contains("authentication failure") || e.contains("not authorized")
            })
    }
}

/// Transport over the switch's HTTPS management API.
///
/// Login stores a session cookie in the client's cookie jar; every command
/// is a GET carrying the CLI text as a query parameter.
pub struct RestTransport {
    config: SwitchConfig,
    client: Option<Client>,
}

impl RestTransport {
    pub fn new(config: SwitchConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    pub fn config(&self) -> &SwitchConfig {
        &self.config
    }

    fn build_client(&self) -> Result<Client> {
        Client::builder()
            // Switches ship with self-signed certificates.
            .danger_accept_invalid_certs(true)
            .cookie_store(true)
            .connect_timeout(self.config.timeout)
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| TransportError::Http(e).into())
    }

    fn request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            TransportError::Timeout(self.config.timeout).into()
        } else if e.is_connect() {
            TransportError::ConnectionFailed {
                host: self.config.host.clone(),
                reason: e.to_string(),
            }
            .into()
        } else {
            TransportError::Http(e).into()
        }
    }

    async fn get(&self, client: &Client, path: &str, query: &[(&str, &str)]) -> Result<(StatusCode, String)> {
        let url = format!("{}{}", self.config.base_url(), path);
        let response = client
            .get(&url)
            .header(reqwest::header::ACCEPT, ACCEPT_JSON)
            .query(query)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.request_error(e))?;
        Ok((status, body))
    }

    async fn login(&self, client: &Client) -> Result<()> {
        let (status, body) = self
            .get(
                client,
                "/auth/",
                &[
                    ("username", self.config.username.as_str()),
                    ("password", self.config.password()),
                ],
            )
            .await?;

        let auth_failed = || TransportError::AuthenticationFailed {
            user: self.config.username.clone(),
        };
        if status == StatusCode::UNAUTHORIZED {
            return Err(auth_failed().into());
        }
        let envelope = Envelope::parse(&body).map_err(|_| TransportError::LoginFailed {
            user: self.config.username.clone(),
            reason: format!("HTTP {status}"),
        })?;
        if envelope.is_auth_failure() {
            return Err(auth_failed().into());
        }
        if let Some(reason) = envelope.error {
            return Err(TransportError::LoginFailed {
                user: self.config.username.clone(),
                reason,
            }
            .into());
        }
        Ok(())
    }
}

impl Transport for RestTransport {
    fn route(&self) -> Route {
        Route::Primary
    }

    fn is_open(&self) -> bool {
        self.client.is_some()
    }

    async fn open(&mut self) -> Result<()> {
        if self.client.is_some() {
            return Ok(());
        }
        let client = self.build_client()?;
        self.login(&client).await?;
        info!("REST session open on {}", self.config.host);
        self.client = Some(client);
        Ok(())
    }

    async fn send(&mut self, command: &str) -> Result<Reply> {
        let client = self.client.clone().ok_or(SessionError::NotConnected)?;
        let start = Instant::now();

        let (mut status, mut body) = self.get(&client, "/cli/aos", &[("cmd", command)]).await?;
        if status == StatusCode::UNAUTHORIZED {
            debug!("REST session expired on {}, logging in again", self.config.host);
            self.login(&client).await?;
            (status, body) = self.get(&client, "/cli/aos", &[("cmd", command)]).await?;
        }

        let envelope = match Envelope::parse(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Ok(Reply::failed(command, body, start.elapsed(), format!("HTTP {status}")));
            }
            Err(e) => return Err(e),
        };
        if envelope.diag == Some(401) {
            return Err(TransportError::AuthenticationFailed {
                user: self.config.username.clone(),
            }
            .into());
        }

        let elapsed = start.elapsed();
        Ok(match envelope.error {
            Some(error) => Reply::failed(command, envelope.output, elapsed, error),
            None => Reply::new(command, envelope.output, elapsed),
        })
    }

    async fn close(&mut self) -> Result<()> {
        if self.client.take().is_some() {
            debug!("REST session closed on {}", self.config.host);
        }
        Ok(())
    }
}
