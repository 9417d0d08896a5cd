//! Command dispatch.
//!
//! [`Dispatcher`] is the single `execute(command)` entry point the rest of
//! the crate talks to. It renders the command, sends it over the statically
//! chosen transport, turns device-reported failures into typed errors and
//! normalizes the reply. Every call is written to the `poewiz::audit` log
//! target. Nothing is retried here.

mod bootstrap;

use std::future::Future;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::command::{Command, CommandResult, Route};
use crate::error::{Error, Result, SessionError, classify_device_error};
use crate::normalize::{CliNormalizer, Normalizer};
use crate::transport::{Reply, Transport};

/// Log target for the per-command audit trail.
pub const AUDIT: &str = "poewiz::audit";

/// Anything that can run switch commands.
///
/// Implemented by [`Dispatcher`]; tests substitute a scripted switch.
pub trait Executor: Send {
    /// Open the primary session.
    fn connect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Run one command and return its normalized result.
    fn execute(&mut self, command: &Command) -> impl Future<Output = Result<CommandResult>> + Send;

    /// Tear down every open session.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Check if the primary session is open.
    fn is_connected(&self) -> bool;
}

/// Routes commands to a primary and a secondary transport.
pub struct Dispatcher<P, S> {
    host: String,
    primary: P,
    secondary: S,
    normalizer: Arc<dyn Normalizer>,
}

impl<P: Transport, S: Transport> Dispatcher<P, S> {
    pub fn new(host: impl Into<String>, primary: P, secondary: S) -> Self {
        Self {
            host: host.into(),
            primary,
            secondary,
            normalizer: Arc::new(CliNormalizer),
        }
    }

    /// Replace the response normalizer.
    pub fn with_normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Send the rendered command over `route`, opening the secondary
    /// session on first use.
    async fn send(&mut self, route: Route, text: &str) -> Result<Reply> {
        match route {
            Route::Primary => {
                if !self.primary.is_open() {
                    return Err(SessionError::NotConnected.into());
                }
                self.primary.send(text).await
            }
            Route::Secondary => {
                self.secondary.open().await?;
                self.secondary.send(text).await
            }
        }
    }

    /// Run `command` over an explicit route, bypassing the static one.
    pub(crate) async fn execute_via(
        &mut self,
        route: Route,
        command: &Command,
    ) -> Result<CommandResult> {
        let text = command.render();
        info!(target: AUDIT, "{} [{}] {}", self.host, route, text);

        let reply = match self.send(route, &text).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(target: AUDIT, "{} [{}] {} -> {}", self.host, route, text, e);
                return Err(e);
            }
        };
        debug!(
            target: AUDIT,
            "{} [{}] {} -> {:?} in {:?}", self.host, route, text, reply.output, reply.elapsed
        );

        if let Some(message) = reply.error {
            let err: Error = classify_device_error(&text, &message).into();
            if err.is_not_supported() {
                warn!(target: AUDIT, "{} {}", self.host, err);
            } else {
                error!(target: AUDIT, "{} {}", self.host, err);
            }
            return Err(err);
        }

        let result = self
            .normalizer
            .normalize(&reply.output, command.shape())
            .inspect_err(|e| error!(target: AUDIT, "{} {} -> {}", self.host, text, e))?;
        debug!(target: AUDIT, "{} {} -> {}", self.host, text, result.summary());
        Ok(result)
    }
}

impl<P: Transport, S: Transport> Executor for Dispatcher<P, S> {
    async fn connect(&mut self) -> Result<()> {
        match self.primary.open().await {
            Ok(()) => Ok(()),
            Err(e) if e.is_bad_credentials() => Err(e),
            Err(e) => {
                warn!(
                    "REST login to {} failed ({}); enabling the management API over SSH",
                    self.host, e
                );
                self.enable_rest().await?;
                self.primary.open().await
            }
        }
    }

    async fn execute(&mut self, command: &Command) -> Result<CommandResult> {
        self.execute_via(command.route(), command).await
    }

    async fn close(&mut self) -> Result<()> {
        // The secondary may be open even when the primary never was.
        let secondary = self.secondary.close().await;
        let primary = self.primary.close().await;
        secondary.and(primary)
    }

    fn is_connected(&self) -> bool {
        self.primary.is_open()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::command::CommandId;
    use crate::error::{CommandError, TransportError};
    use crate::topology::SlotId;

    /// Scripted transport; shares its sent-command log with the test.
    pub(crate) struct ScriptedTransport {
        route: Route,
        open: bool,
        pub(crate) open_results: VecDeque<Result<()>>,
        pub(crate) replies: VecDeque<Reply>,
        pub(crate) log: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(route: Route, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                route,
                open: false,
                open_results: VecDeque::new(),
                replies: VecDeque::new(),
                log,
            }
        }

        pub(crate) fn reply(mut self, output: &str) -> Self {
            self.replies
                .push_back(Reply::new("", output, Duration::from_millis(5)));
            self
        }

        pub(crate) fn fail(mut self, error: &str) -> Self {
            self.replies
                .push_back(Reply::failed("", "", Duration::from_millis(5), error));
            self
        }

        pub(crate) fn open_with(mut self, result: Result<()>) -> Self {
            self.open_results.push_back(result);
            self
        }
    }

    impl Transport for ScriptedTransport {
        fn route(&self) -> Route {
            self.route
        }

        fn is_open(&self) -> bool {
            self.open
        }

        async fn open(&mut self) -> Result<()> {
            if self.open {
                return Ok(());
            }
            self.log.lock().unwrap().push(format!("{}:open", self.route));
            let result = self.open_results.pop_front().unwrap_or(Ok(()));
            self.open = result.is_ok();
            result
        }

        async fn send(&mut self, command: &str) -> Result<Reply> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.route, command));
            Ok(self
                .replies
                .pop_front()
                .unwrap_or_else(|| Reply::new(command, "", Duration::ZERO)))
        }

        async fn close(&mut self) -> Result<()> {
            if self.open {
                self.log.lock().unwrap().push(format!("{}:close", self.route));
            }
            self.open = false;
            Ok(())
        }
    }

    fn dispatcher(
        primary: ScriptedTransport,
        secondary: ScriptedTransport,
    ) -> Dispatcher<ScriptedTransport, ScriptedTransport> {
        Dispatcher::new("10.0.0.1", primary, secondary)
    }

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(vec![]))
    }

    #[tokio::test]
    async fn test_static_routing() {
        let log = log();
        let mut d = dispatcher(
            ScriptedTransport::new(Route::Primary, log.clone()).reply("OS6860 8.9.1"),
            ScriptedTransport::new(Route::Secondary, log.clone()),
        );
        d.connect().await.unwrap();
        d.execute(&Command::new(CommandId::ShowMicrocode)).await.unwrap();
        d.execute(&Command::with_params(CommandId::ShowDebugLevel, ["lpNi"]))
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "rest:open",
                "rest:show microcode",
                "ssh:open",
                "ssh:show swlog appid lpNi",
            ]
        );
    }

    #[tokio::test]
    async fn test_device_errors_are_typed() {
        let log = log();
        let mut d = dispatcher(
            ScriptedTransport::new(Route::Primary, log.clone())
                .fail("ERROR: Lanpower not supported on slot 1/2")
                .fail("ERROR: Invalid entry: \"8023bt\""),
            ScriptedTransport::new(Route::Secondary, log.clone()),
        );
        d.connect().await.unwrap();

        let slot = SlotId::new(1, 2);
        let err = d
            .execute(&Command::slot(CommandId::ShowLanPower, slot))
            .await
            .unwrap_err();
        assert!(err.is_not_supported());
        assert!(err.slot_lacks_poe());

        let err = d
            .execute(&Command::slot(CommandId::Enable8023bt, slot))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Command(CommandError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_execute_requires_connect() {
        let log = log();
        let mut d = dispatcher(
            ScriptedTransport::new(Route::Primary, log.clone()),
            ScriptedTransport::new(Route::Secondary, log.clone()),
        );
        let err = d
            .execute(&Command::new(CommandId::ShowChassis))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::NotConnected)));
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_bootstrapped() {
        let log = log();
        let mut d = dispatcher(
            ScriptedTransport::new(Route::Primary, log.clone()).open_with(Err(
                TransportError::AuthenticationFailed {
                    user: "admin".into(),
                }
                .into(),
            )),
            ScriptedTransport::new(Route::Secondary, log.clone()),
        );
        assert!(d.connect().await.unwrap_err().is_auth_failure());
        assert_eq!(*log.lock().unwrap(), vec!["rest:open"]);
    }

    #[tokio::test]
    async fn test_rest_disabled_is_bootstrapped() {
        let log = log();
        let mut d = dispatcher(
            ScriptedTransport::new(Route::Primary, log.clone()).open_with(Err(
                TransportError::LoginFailed {
                    user: "admin".into(),
                    reason: "HTTP 404".into(),
                }
                .into(),
            )),
            ScriptedTransport::new(Route::Secondary, log.clone())
                .reply("aaa authentication default \"local\"\naaa authentication http \"local\"\n")
                .reply("Name      Port Status\n--------+-----+---------\nhttp        80 enabled\n"),
        );
        d.connect().await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "rest:open",
                "ssh:open",
                "ssh:show configuration snapshot aaa",
                "ssh:show ip service",
                "ssh:close",
                "rest:open",
            ]
        );
        assert!(d.is_connected());
    }

    #[tokio::test]
    async fn test_close_tears_down_secondary_without_primary() {
        let log = log();
        let mut d = dispatcher(
            ScriptedTransport::new(Route::Primary, log.clone()),
            ScriptedTransport::new(Route::Secondary, log.clone()),
        );
        d.execute(&Command::with_params(CommandId::ShowDebugLevel, ["lpNi"]))
            .await
            .unwrap();
        d.close().await.unwrap();
        assert_eq!(log.lock().unwrap().last().unwrap(), "ssh:close");
        assert!(!d.is_connected());
    }
}
