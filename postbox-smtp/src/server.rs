use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use postbox_common::{CapturedMessage, config::CaptureConfig, internal};
use thiserror::Error;
use tokio::{
    net::TcpListener,
    sync::oneshot,
    task::{JoinHandle, JoinSet},
    time::Instant,
};

use crate::{session::Session, store::CaptureStore};

/// How often `wait_for_messages` re-checks the store.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Errors raised by the capture server.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The listening socket could not be bound, usually because another
    /// server already holds the port.
    #[error("Failed to bind capture server to {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Fewer messages than expected arrived before the deadline.
    #[error("Timed out after {waited:?} waiting for {expected} messages, received {received}")]
    Timeout {
        expected: usize,
        received: usize,
        waited: Duration,
    },
}

/// An SMTP server that accepts every delivery and keeps it in memory.
///
/// The listening socket is released by [`CaptureServer::stop`], or, if the
/// server is dropped without being stopped, when the accept task is aborted.
///
/// ```no_run
/// use postbox_common::config::CaptureConfig;
/// use postbox_smtp::CaptureServer;
///
/// # async fn example() -> Result<(), postbox_smtp::CaptureError> {
/// let mut server = CaptureServer::start(&CaptureConfig::default()).await?;
/// // ... deliver mail to server.addr() ...
/// let messages = server.received_messages();
/// server.stop().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CaptureServer {
    addr: SocketAddr,
    store: CaptureStore,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CaptureServer {
    /// Binds the configured address and starts accepting deliveries.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Bind`] if the address cannot be bound.
    pub async fn start(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let address = SocketAddr::new(config.host, config.port);
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| CaptureError::Bind { address, source })?;
        let addr = listener.local_addr()?;

        let store = CaptureStore::new();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let hostname: Arc<str> = Arc::from(config.hostname.as_str());

        let task = tokio::spawn(Self::serve(
            listener,
            hostname,
            config.max_message_size,
            store.clone(),
            shutdown_rx,
        ));

        internal!(level = INFO, "Capture server listening on {}", addr);

        Ok(Self {
            addr,
            store,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    async fn serve(
        listener: TcpListener,
        hostname: Arc<str>,
        max_message_size: usize,
        store: CaptureStore,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        internal!(level = DEBUG, "Accepted connection from {}", peer);
                        let session = Session::new(stream, peer, Arc::clone(&hostname), store.clone())
                            .with_max_message_size(max_message_size);
                        sessions.spawn(async move {
                            if let Err(err) = session.run().await {
                                tracing::debug!(%peer, %err, "Capture session ended with error");
                            }
                        });
                    }
                    Err(err) => tracing::warn!(%err, "Failed to accept connection"),
                },
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            }
        }

        sessions.shutdown().await;
        drop(listener);
        internal!(level = INFO, "Capture server stopped");
    }

    /// The address the server is bound to. With port 0 configured this is
    /// where the ephemeral port can be read.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Messages received since start (or the last [`clear`](Self::clear)),
    /// in delivery order.
    #[must_use]
    pub fn received_messages(&self) -> Vec<CapturedMessage> {
        self.store.snapshot()
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Handle on the underlying store, shared with running sessions.
    #[must_use]
    pub fn store(&self) -> CaptureStore {
        self.store.clone()
    }

    /// Waits until at least `count` messages were received.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Timeout`] if they do not arrive in time.
    pub async fn wait_for_messages(
        &self,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<CapturedMessage>, CaptureError> {
        let start = Instant::now();

        loop {
            let received = self.store.len();
            if received >= count {
                return Ok(self.store.snapshot());
            }

            if start.elapsed() > timeout {
                return Err(CaptureError::Timeout {
                    expected: count,
                    received,
                    waited: timeout,
                });
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Stops accepting, closes open sessions and releases the port.
    ///
    /// Calling this more than once is a no-op.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(%err, "Capture server task failed");
            }
        }
    }
}

impl Drop for CaptureServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
