//! SMTP client used by flows to deliver mail.
//!
//! Plain TCP only; the capture server does not offer STARTTLS.
//!
//! # Examples
//!
//! ```no_run
//! use postbox_smtp::client::{MessageBuilder, SmtpClientBuilder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let message = MessageBuilder::new()
//!     .from("sender@example.com")
//!     .to("to@example.com")
//!     .subject("Test")
//!     .body("Hello World")
//!     .build()?;
//!
//! let responses = SmtpClientBuilder::new("127.0.0.1:2525")
//!     .ehlo("client.example.com")
//!     .mail_from("sender@example.com")
//!     .rcpt_to("to@example.com")
//!     .data_with_message(message)
//!     .execute()
//!     .await?;
//!
//! assert!(responses.last().is_some_and(|r| r.is_success()));
//! # Ok(())
//! # }
//! ```

mod builder;
mod error;
mod message;
mod response;
mod smtp_client;

pub use builder::SmtpClientBuilder;
pub use error::{ClientError, Result};
pub use message::{Attachment, MessageBuilder};
pub use response::{Response, ResponseLine};
pub use smtp_client::SmtpClient;
