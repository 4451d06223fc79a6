//! Builder pattern for constructing SMTP client sessions.

use super::{
    error::{ClientError, Result},
    response::Response,
    smtp_client::SmtpClient,
};

/// A step in the SMTP conversation.
#[derive(Debug, Clone)]
enum Step {
    Ehlo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    SendData(String),
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Self::Ehlo(_) => "EHLO",
            Self::MailFrom(_) => "MAIL FROM",
            Self::RcptTo(_) => "RCPT TO",
            Self::Data => "DATA",
            Self::SendData(_) => "end of data",
        }
    }

    /// Whether `response` lets the conversation continue past this step.
    const fn accepts(&self, response: &Response) -> bool {
        match self {
            Self::Data => response.code == 354,
            _ => response.is_success(),
        }
    }
}

/// Builder for creating and executing SMTP client sessions.
///
/// Every step must be accepted by the server; the first refusal ends the
/// session with [`ClientError::SmtpError`].
///
/// # Examples
///
/// ```no_run
/// use postbox_smtp::client::SmtpClientBuilder;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let responses = SmtpClientBuilder::new("127.0.0.1:2525")
///     .ehlo("client.example.com")
///     .mail_from("sender@example.com")
///     .rcpt_to_multiple(&["to@example.com", "cc@example.com"])
///     .data_with_message("Subject: Test\r\n\r\nHello World")
///     .execute()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SmtpClientBuilder {
    server_addr: String,
    steps: Vec<Step>,
}

impl SmtpClientBuilder {
    /// Creates a new builder for a session with the server at `server_addr`
    /// (e.g. "127.0.0.1:2525").
    #[must_use]
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            steps: Vec::new(),
        }
    }

    /// Sends EHLO with the specified domain.
    #[must_use]
    pub fn ehlo(mut self, domain: impl Into<String>) -> Self {
        self.steps.push(Step::Ehlo(domain.into()));
        self
    }

    /// Sends MAIL FROM command.
    #[must_use]
    pub fn mail_from(mut self, from: impl Into<String>) -> Self {
        self.steps.push(Step::MailFrom(from.into()));
        self
    }

    /// Sends RCPT TO command.
    #[must_use]
    pub fn rcpt_to(mut self, to: impl Into<String>) -> Self {
        self.steps.push(Step::RcptTo(to.into()));
        self
    }

    /// Sends one RCPT TO command per recipient.
    #[must_use]
    pub fn rcpt_to_multiple(mut self, recipients: &[impl AsRef<str>]) -> Self {
        self.steps.extend(
            recipients
                .iter()
                .map(|recipient| Step::RcptTo(recipient.as_ref().to_string())),
        );
        self
    }

    /// Sends DATA followed by the message content.
    #[must_use]
    pub fn data_with_message(mut self, message: impl Into<String>) -> Self {
        self.steps.push(Step::Data);
        self.steps.push(Step::SendData(message.into()));
        self
    }

    async fn execute_step(client: &mut SmtpClient, step: &Step) -> Result<Response> {
        match step {
            Step::Ehlo(domain) => client.ehlo(domain).await,
            Step::MailFrom(from) => client.mail_from(from).await,
            Step::RcptTo(to) => client.rcpt_to(to).await,
            Step::Data => client.data().await,
            Step::SendData(data) => client.send_data(data).await,
        }
    }

    /// Runs every step, then QUIT, and returns all responses.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the server refuses a step.
    pub async fn execute(self) -> Result<Vec<Response>> {
        let mut client = SmtpClient::connect(&self.server_addr).await?;

        let greeting = client.read_greeting().await?;
        if !greeting.is_success() {
            return Err(ClientError::SmtpError {
                command: "connect".to_string(),
                code: greeting.code,
                message: greeting.message(),
            });
        }

        for step in &self.steps {
            let response = Self::execute_step(&mut client, step).await?;
            if !step.accepts(&response) {
                let _ = client.quit().await;
                return Err(ClientError::SmtpError {
                    command: step.name().to_string(),
                    code: response.code,
                    message: response.message(),
                });
            }
        }

        client.quit().await?;

        Ok(client.responses().to_vec())
    }
}
