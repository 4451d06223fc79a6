use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
    time::SystemTime,
};

use mailparse::{MailAddr, MailHeader, MailHeaderMap};
use serde::{Deserialize, Serialize};

use crate::{error::DecodeError, mime::Part};

/// The header a recipient was addressed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecipientType {
    To,
    Cc,
    Bcc,
}

impl RecipientType {
    #[must_use]
    pub const fn header(self) -> &'static str {
        match self {
            Self::To => "To",
            Self::Cc => "Cc",
            Self::Bcc => "Bcc",
        }
    }
}

impl Display for RecipientType {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Self::To => "To Address",
            Self::Cc => "CC Address",
            Self::Bcc => "BCC Address",
        })
    }
}

/// A single mailbox, as read from an address header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: Option<String>,
    pub addr: String,
}

impl Address {
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            name: None,
            addr: addr.into(),
        }
    }

    fn matches(&self, mailbox: &str) -> bool {
        self.addr.eq_ignore_ascii_case(mailbox)
    }
}

impl Display for Address {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if !name.is_empty() => write!(fmt, "{name} <{}>", self.addr),
            _ => fmt.write_str(&self.addr),
        }
    }
}

/// Renders a list of addresses the way they are compared in assertions:
/// comma separated, in header order.
#[must_use]
pub fn render_addresses(addresses: &[Address]) -> String {
    addresses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// An email received by the capture server.
///
/// One `CapturedMessage` exists per accepted envelope recipient, so a message
/// sent to two mailboxes is captured twice, each copy knowing which mailbox it
/// was delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedMessage {
    sender: Option<String>,
    delivered_to: String,
    data: Arc<[u8]>,
    received_at: SystemTime,
}

impl CapturedMessage {
    #[must_use]
    pub fn new(sender: Option<String>, delivered_to: impl Into<String>, data: Arc<[u8]>) -> Self {
        Self {
            sender,
            delivered_to: delivered_to.into(),
            data,
            received_at: SystemTime::now(),
        }
    }

    /// The envelope sender, `None` for the null reverse-path.
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// The envelope recipient this copy was delivered to.
    #[must_use]
    pub fn delivered_to(&self) -> &str {
        &self.delivered_to
    }

    /// The message exactly as received, after dot-unstuffing.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub const fn received_at(&self) -> SystemTime {
        self.received_at
    }

    fn headers(&self) -> Result<Vec<MailHeader<'_>>, DecodeError> {
        let (headers, _) = mailparse::parse_headers(&self.data)?;
        Ok(headers)
    }

    /// The decoded value of the first header named `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the header block is malformed.
    pub fn header(&self, name: &str) -> Result<Option<String>, DecodeError> {
        Ok(self.headers()?.get_first_value(name))
    }

    /// The decoded `Subject` header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header block is malformed.
    pub fn subject(&self) -> Result<Option<String>, DecodeError> {
        self.header("Subject")
    }

    /// The recipients of the given type, in header order.
    ///
    /// Blind copies never reach the delivered headers, so `Bcc` is derived
    /// from the envelope: the delivered-to mailbox is a blind copy when it
    /// appears in neither `To` nor `Cc`.
    ///
    /// # Errors
    ///
    /// Returns an error if the headers or an address list are malformed.
    pub fn recipients(&self, kind: RecipientType) -> Result<Vec<Address>, DecodeError> {
        let headers = self.headers()?;
        let mut addresses = addresses_in(&headers, kind.header())?;

        if kind == RecipientType::Bcc {
            let visible = [
                addresses_in(&headers, RecipientType::To.header())?,
                addresses_in(&headers, RecipientType::Cc.header())?,
            ];

            let mentioned = visible
                .iter()
                .chain(std::iter::once(&addresses))
                .flatten()
                .any(|address| address.matches(&self.delivered_to));

            if !mentioned {
                addresses.push(Address::new(self.delivered_to.clone()));
            }
        }

        Ok(addresses)
    }

    /// Decodes the message into its part tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the MIME structure or a transfer encoding is
    /// malformed.
    pub fn content(&self) -> Result<Part, DecodeError> {
        let mail = mailparse::parse_mail(&self.data)?;
        Part::from_mail(&mail)
    }

    /// The text body of the message: the whole body for single-part
    /// messages, otherwise the first text part that is not a named
    /// attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be decoded or has no text body.
    pub fn body_text(&self) -> Result<String, DecodeError> {
        self.content()?
            .text_body()
            .ok_or(DecodeError::NoTextBody)?
            .text()
    }
}

fn addresses_in(headers: &[MailHeader<'_>], name: &str) -> Result<Vec<Address>, DecodeError> {
    let mut addresses = Vec::new();

    for header in headers.get_all_headers(name) {
        for addr in mailparse::addrparse_header(header)?.iter() {
            match addr {
                MailAddr::Group(group) => {
                    addresses.extend(group.addrs.iter().map(|single| Address {
                        name: single.display_name.clone(),
                        addr: single.addr.clone(),
                    }));
                }
                MailAddr::Single(single) => addresses.push(Address {
                    name: single.display_name.clone(),
                    addr: single.addr.clone(),
                }),
            }
        }
    }

    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn captured(delivered_to: &str, data: &str) -> CapturedMessage {
        CapturedMessage::new(
            Some("sender@example.com".to_string()),
            delivered_to,
            Arc::from(data.as_bytes()),
        )
    }

    const SIMPLE: &str = "From: sender@example.com\r\n\
        To: to@example.com\r\n\
        Cc: cc@example.com\r\n\
        Subject: Welcome to UT\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        \r\n\
        Welcome to UnitTesters.com\r\n";

    #[test]
    fn test_render_recipients() {
        let message = captured("to@example.com", SIMPLE);

        let to = message.recipients(RecipientType::To).unwrap();
        let cc = message.recipients(RecipientType::Cc).unwrap();

        assert_eq!(render_addresses(&to), "to@example.com");
        assert_eq!(render_addresses(&cc), "cc@example.com");
    }

    #[test]
    fn test_render_multiple_and_named() {
        let message = captured(
            "a@example.com",
            "To: Alice <a@example.com>, b@example.com\r\nSubject: x\r\n\r\nbody\r\n",
        );

        let to = message.recipients(RecipientType::To).unwrap();
        assert_eq!(render_addresses(&to), "Alice <a@example.com>, b@example.com");
    }

    #[test]
    fn test_group_addresses_are_flattened() {
        let message = captured(
            "a@example.com",
            "To: Team: a@example.com, b@example.com;\r\n\r\nbody\r\n",
        );

        let to = message.recipients(RecipientType::To).unwrap();
        assert_eq!(render_addresses(&to), "a@example.com, b@example.com");
    }

    #[test]
    fn test_missing_header_renders_empty() {
        let message = captured("to@example.com", "Subject: x\r\n\r\nbody\r\n");

        let cc = message.recipients(RecipientType::Cc).unwrap();
        assert_eq!(render_addresses(&cc), "");
    }

    #[test]
    fn test_bcc_derived_from_envelope() {
        let visible = captured("cc@example.com", SIMPLE);
        assert!(visible.recipients(RecipientType::Bcc).unwrap().is_empty());

        let blind = captured("hidden@example.com", SIMPLE);
        assert_eq!(
            render_addresses(&blind.recipients(RecipientType::Bcc).unwrap()),
            "hidden@example.com"
        );
    }

    #[test]
    fn test_subject_and_body() {
        let message = captured("to@example.com", SIMPLE);

        assert_eq!(message.subject().unwrap().as_deref(), Some("Welcome to UT"));
        assert_eq!(message.body_text().unwrap().trim(), "Welcome to UnitTesters.com");
    }

    #[test]
    fn test_encoded_subject_is_decoded() {
        let message = captured(
            "to@example.com",
            "Subject: =?utf-8?q?Caf=C3=A9?=\r\n\r\nbody\r\n",
        );

        assert_eq!(message.subject().unwrap().as_deref(), Some("Café"));
    }
}
