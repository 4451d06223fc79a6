//! Wiring for a mail test: capture server first, then the flows that deliver
//! to it.

use std::{net::SocketAddr, path::Path, time::Duration};

use postbox_common::{CapturedMessage, config::PostboxConfig, internal, logging};
use postbox_smtp::CaptureServer;

use crate::flow::{Event, FlowRegistry};

/// A running capture server together with the flows under test.
///
/// Mail flows that declare no relay of their own deliver to the capture
/// server. Call [`shutdown`](Self::shutdown) at the end of a test; dropping
/// the harness without it still releases the port.
///
/// ```no_run
/// use postbox::{Event, MailTestHarness, assertions::expect_count};
/// use postbox_common::config::PostboxConfig;
///
/// # async fn example(config: PostboxConfig) -> anyhow::Result<()> {
/// let harness = MailTestHarness::start(config).await?;
/// harness
///     .run_flow("subflow-mail-sender", &Event::new("Welcome to UnitTesters.com"))
///     .await?;
/// expect_count(&harness.received_messages(), 2)?;
/// harness.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MailTestHarness {
    server: CaptureServer,
    flows: FlowRegistry,
}

impl MailTestHarness {
    /// Starts the capture server and builds the flow registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the capture server cannot bind its address.
    pub async fn start(config: PostboxConfig) -> anyhow::Result<Self> {
        logging::init();

        let server = CaptureServer::start(&config.capture).await?;
        let relay = server.addr().to_string();
        let flows = FlowRegistry::from_config(&config.flows, &relay, &config.capture.hostname);

        internal!(
            level = INFO,
            "Mail test harness ready on {} with flows {:?}",
            relay,
            flows.names()
        );

        Ok(Self { server, flows })
    }

    /// Loads the configuration at `path` and starts a harness from it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is invalid or the server cannot start.
    pub async fn from_config_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::start(PostboxConfig::from_file(path)?).await
    }

    /// Starts a harness from the configuration named by `POSTBOX_CONFIG`,
    /// or `./postbox.config.ron`.
    ///
    /// # Errors
    ///
    /// Returns an error if no valid configuration is found or the server
    /// cannot start.
    pub async fn from_env() -> anyhow::Result<Self> {
        Self::start(PostboxConfig::load()?).await
    }

    /// Runs the named flow and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the flow is unknown or fails.
    pub async fn run_flow(&self, name: &str, event: &Event) -> anyhow::Result<()> {
        self.flows.run_flow(name, event).await?;
        Ok(())
    }

    pub const fn flows(&self) -> &FlowRegistry {
        &self.flows
    }

    pub const fn capture_addr(&self) -> SocketAddr {
        self.server.addr()
    }

    pub fn received_messages(&self) -> Vec<CapturedMessage> {
        self.server.received_messages()
    }

    /// Forgets every message captured so far.
    pub fn clear(&self) {
        self.server.clear();
    }

    /// Waits until at least `count` messages were captured.
    ///
    /// # Errors
    ///
    /// Returns an error if they do not arrive within `timeout`.
    pub async fn wait_for_messages(
        &self,
        count: usize,
        timeout: Duration,
    ) -> anyhow::Result<Vec<CapturedMessage>> {
        Ok(self.server.wait_for_messages(count, timeout).await?)
    }

    /// Stops the capture server and releases its port.
    pub async fn shutdown(mut self) {
        self.server.stop().await;
    }
}
