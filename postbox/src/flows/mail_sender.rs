use async_trait::async_trait;
use postbox_common::{config::MailFlowConfig, internal};
use postbox_smtp::client::{MessageBuilder, SmtpClientBuilder};

use crate::flow::{Event, Flow, FlowError};

/// Event property that replaces the configured subject for one run.
pub const SUBJECT_PROPERTY: &str = "subject";

/// Mails the event payload to the configured recipients.
///
/// The payload is the text body, and is attached once more under each
/// configured attachment name. Bcc recipients only appear in the envelope.
#[derive(Debug, Clone)]
pub struct MailSenderFlow {
    name: String,
    config: MailFlowConfig,
    relay: String,
    helo: String,
}

impl MailSenderFlow {
    pub fn new(
        name: impl Into<String>,
        config: MailFlowConfig,
        relay: impl Into<String>,
        helo: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            relay: relay.into(),
            helo: helo.into(),
        }
    }

    pub fn relay(&self) -> &str {
        &self.relay
    }

    /// Renders the message this flow sends for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Message`] if the message cannot be built.
    pub fn message(&self, event: &Event) -> Result<String, FlowError> {
        let subject = event
            .property(SUBJECT_PROPERTY)
            .unwrap_or(self.config.subject.as_str());

        let builder = MessageBuilder::new()
            .from(&self.config.from)
            .to_multiple(&self.config.to)
            .cc_multiple(&self.config.cc)
            .subject(subject)
            .body(&event.payload);

        self.config
            .attachments
            .iter()
            .fold(builder, |builder, attachment| {
                builder.attach(
                    &attachment.filename,
                    &attachment.content_type,
                    event.payload.as_bytes().to_vec(),
                )
            })
            .build()
            .map_err(|source| FlowError::Message {
                flow: self.name.clone(),
                source,
            })
    }
}

#[async_trait]
impl Flow for MailSenderFlow {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, event: &Event) -> Result<(), FlowError> {
        let message = self.message(event)?;
        let recipients = self.config.envelope_recipients();

        internal!(
            level = DEBUG,
            "Flow {} sending to {} recipients via {}",
            self.name,
            recipients.len(),
            self.relay
        );

        SmtpClientBuilder::new(&self.relay)
            .ehlo(&self.helo)
            .mail_from(&self.config.from)
            .rcpt_to_multiple(&recipients)
            .data_with_message(message)
            .execute()
            .await
            .map_err(|source| FlowError::Delivery {
                flow: self.name.clone(),
                source,
            })?;

        Ok(())
    }
}
