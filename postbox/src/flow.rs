//! Triggering flows by name.
//!
//! A [`Flow`] is a unit of integration logic that takes an [`Event`] and
//! sends mail as a side effect. [`FlowRegistry::run_flow`] looks a flow up by
//! name and awaits it, so once it returns every delivery the flow made has
//! been accepted by the relay.

use std::{fmt, sync::Arc};

use ahash::AHashMap;
use async_trait::async_trait;
use postbox_common::{
    config::{FlowConfig, FlowKind},
    internal,
};
use postbox_smtp::client::ClientError;
use thiserror::Error;

use crate::flows::MailSenderFlow;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("No flow named '{0}' is registered")]
    UnknownFlow(String),

    /// The flow could not assemble its message.
    #[error("Failed to build message in flow '{flow}': {source}")]
    Message {
        flow: String,
        #[source]
        source: ClientError,
    },

    /// The relay refused or dropped the delivery.
    #[error("Failed to deliver mail from flow '{flow}': {source}")]
    Delivery {
        flow: String,
        #[source]
        source: ClientError,
    },
}

/// The input a flow is triggered with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    pub payload: String,
    pub properties: AHashMap<String, String>,
}

impl Event {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            properties: AHashMap::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

#[async_trait]
pub trait Flow: Send + Sync {
    fn name(&self) -> &str;

    /// Runs the flow to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if any step of the flow fails.
    async fn run(&self, event: &Event) -> Result<(), FlowError>;
}

/// Named flows available to a test.
#[derive(Default, Clone)]
pub struct FlowRegistry {
    flows: AHashMap<String, Arc<dyn Flow>>,
}

impl fmt::Debug for FlowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowRegistry")
            .field("flows", &self.names())
            .finish()
    }
}

impl FlowRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from flow declarations.
    ///
    /// Mail flows without an explicit relay deliver to `relay`.
    pub fn from_config(flows: &[FlowConfig], relay: &str, helo: &str) -> Self {
        let mut registry = Self::new();

        for flow in flows {
            match &flow.kind {
                FlowKind::Mail(mail) => {
                    let relay = mail.relay.as_deref().unwrap_or(relay);
                    registry.register(MailSenderFlow::new(&flow.name, mail.clone(), relay, helo));
                }
            }
        }

        registry
    }

    /// Adds `flow`, replacing any flow registered under the same name.
    pub fn register(&mut self, flow: impl Flow + 'static) {
        let name = flow.name().to_string();
        if self.flows.insert(name.clone(), Arc::new(flow)).is_some() {
            tracing::warn!(flow = %name, "Replaced previously registered flow");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.flows.contains_key(name)
    }

    /// Registered flow names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.flows.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs the flow called `name` with `event` and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::UnknownFlow`] if no such flow is registered, or
    /// whatever error the flow itself fails with.
    pub async fn run_flow(&self, name: &str, event: &Event) -> Result<(), FlowError> {
        let flow = self
            .flows
            .get(name)
            .ok_or_else(|| FlowError::UnknownFlow(name.to_string()))?;

        internal!("Running flow {}", name);
        flow.run(event).await?;
        internal!(level = DEBUG, "Flow {} completed", name);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;

    struct Counting {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Flow for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn run(&self, event: &Event) -> Result<(), FlowError> {
            assert_eq!(event.payload, "payload");
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_registered_flow() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut registry = FlowRegistry::new();
        registry.register(Counting {
            runs: Arc::clone(&runs),
        });

        registry
            .run_flow("counting", &Event::new("payload"))
            .await
            .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_flow() {
        let registry = FlowRegistry::new();

        let err = registry
            .run_flow("missing", &Event::new("payload"))
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::UnknownFlow(name) if name == "missing"));
    }

    #[test]
    fn test_event_properties() {
        let event = Event::new("body").with_property("subject", "Override");

        assert_eq!(event.property("subject"), Some("Override"));
        assert_eq!(event.property("other"), None);
    }

    #[test]
    fn test_from_config() {
        let config = postbox_common::config::PostboxConfig::from_ron(
            r#"(
                flows: [
                    (name: "b", kind: Mail((from: "f@example.com", to: ["t@example.com"], subject: "s"))),
                    (name: "a", kind: Mail((from: "f@example.com", cc: ["c@example.com"], subject: "s"))),
                ],
            )"#,
        )
        .unwrap();

        let registry = FlowRegistry::from_config(&config.flows, "127.0.0.1:2525", "localhost");

        assert_eq!(registry.names(), vec!["a", "b"]);
        assert!(registry.contains("a"));
        assert!(!registry.contains("c"));
    }
}
