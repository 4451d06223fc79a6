//! Email message builder with support for headers, body, and MIME attachments.

use std::{
    io::Write,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use super::error::{ClientError, Result};

/// An email attachment with filename, content type, and data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// The filename to use in the MIME headers.
    pub filename: String,
    /// The MIME content type (e.g., "text/plain").
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Builder for RFC 5322 messages.
///
/// Without attachments the message is a single `text/plain` part; with
/// attachments it becomes `multipart/mixed` with the body first and one
/// base64 part per attachment.
///
/// ```
/// use postbox_smtp::client::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .from("sender@example.com")
///     .to("recipient@example.com")
///     .subject("Hello")
///     .body("This is the message body")
///     .build()
///     .unwrap();
///
/// assert!(message.contains("Subject: Hello\r\n"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Vec<String>,
    cc: Vec<String>,
    subject: Option<String>,
    headers: Vec<(String, String)>,
    body: Option<String>,
    attachments: Vec<Attachment>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the From header.
    #[must_use]
    pub fn from(mut self, email: impl Into<String>) -> Self {
        self.from = Some(email.into());
        self
    }

    /// Adds a recipient to the To header.
    #[must_use]
    pub fn to(mut self, email: impl Into<String>) -> Self {
        self.to.push(email.into());
        self
    }

    /// Adds multiple recipients to the To header.
    #[must_use]
    pub fn to_multiple(mut self, emails: &[impl AsRef<str>]) -> Self {
        self.to
            .extend(emails.iter().map(|email| email.as_ref().to_string()));
        self
    }

    /// Adds a recipient to the Cc header.
    #[must_use]
    pub fn cc(mut self, email: impl Into<String>) -> Self {
        self.cc.push(email.into());
        self
    }

    /// Adds multiple recipients to the Cc header.
    #[must_use]
    pub fn cc_multiple(mut self, emails: &[impl AsRef<str>]) -> Self {
        self.cc
            .extend(emails.iter().map(|email| email.as_ref().to_string()));
        self
    }

    /// Sets the Subject header.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Adds a custom header, written in insertion order.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the message body content.
    #[must_use]
    pub fn body(mut self, content: impl Into<String>) -> Self {
        self.body = Some(content.into());
        self
    }

    /// Adds an attachment from raw data.
    #[must_use]
    pub fn attach(
        mut self,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.attachments.push(Attachment {
            filename: filename.into(),
            content_type: content_type.into(),
            data,
        });
        self
    }

    /// Builds the final email message with proper MIME formatting.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no From header or a header value spans
    /// several lines.
    pub fn build(self) -> Result<String> {
        let from = self
            .from
            .as_deref()
            .ok_or_else(|| ClientError::BuilderError("From header is required".to_string()))?;

        let mut message = Vec::with_capacity(1024);

        write!(&mut message, "From: {from}\r\n")?;
        if !self.to.is_empty() {
            write!(&mut message, "To: {}\r\n", self.to.join(", "))?;
        }
        if !self.cc.is_empty() {
            write!(&mut message, "Cc: {}\r\n", self.cc.join(", "))?;
        }
        if let Some(subject) = &self.subject {
            write!(&mut message, "Subject: {}\r\n", header_value(subject)?)?;
        }
        for (name, value) in &self.headers {
            write!(&mut message, "{name}: {}\r\n", header_value(value)?)?;
        }
        write!(&mut message, "MIME-Version: 1.0\r\n")?;

        let body = self.body.as_deref().unwrap_or_default();

        if self.attachments.is_empty() {
            write!(&mut message, "Content-Type: text/plain; charset=utf-8\r\n")?;
            write!(&mut message, "\r\n")?;
            write!(&mut message, "{body}")?;
        } else {
            let boundary = generate_boundary();

            write!(
                &mut message,
                "Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n"
            )?;
            write!(&mut message, "\r\n")?;

            write!(&mut message, "--{boundary}\r\n")?;
            write!(&mut message, "Content-Type: text/plain; charset=utf-8\r\n")?;
            write!(&mut message, "\r\n")?;
            write!(&mut message, "{body}\r\n")?;

            for attachment in &self.attachments {
                let content_type = header_value(&attachment.content_type)?;
                let filename = quoted_parameter(&attachment.filename)?;

                write!(&mut message, "--{boundary}\r\n")?;
                if content_type.starts_with("text/") && !content_type.contains("charset=") {
                    write!(
                        &mut message,
                        "Content-Type: {content_type}; charset=utf-8; name=\"{filename}\"\r\n"
                    )?;
                } else {
                    write!(
                        &mut message,
                        "Content-Type: {content_type}; name=\"{filename}\"\r\n"
                    )?;
                }
                write!(&mut message, "Content-Transfer-Encoding: base64\r\n")?;
                write!(
                    &mut message,
                    "Content-Disposition: attachment; filename=\"{filename}\"\r\n"
                )?;
                write!(&mut message, "\r\n")?;
                write!(&mut message, "{}", base64_encode(&attachment.data))?;
            }

            write!(&mut message, "--{boundary}--\r\n")?;
        }

        String::from_utf8(message).map_err(|e| ClientError::Utf8Error(e.utf8_error()))
    }
}

/// Rejects values that would break out of their header line.
fn header_value(value: &str) -> Result<&str> {
    if value.contains(['\r', '\n']) {
        Err(ClientError::BuilderError(format!(
            "Header value spans multiple lines: {value:?}"
        )))
    } else {
        Ok(value)
    }
}

/// Rejects values that cannot sit inside a quoted header parameter.
fn quoted_parameter(value: &str) -> Result<&str> {
    let value = header_value(value)?;
    if value.contains(['"', '\\']) {
        Err(ClientError::BuilderError(format!(
            "Parameter value contains a quote or backslash: {value:?}"
        )))
    } else {
        Ok(value)
    }
}

/// Generates a MIME boundary unique within this process.
fn generate_boundary() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();

    format!(
        "----=_Part_{}_{timestamp}",
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Encodes data as base64 with line wrapping at 76 characters.
fn base64_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    const GROUPS_PER_LINE: usize = 19;

    let mut result = String::with_capacity(data.len() * 4 / 3 + 8);

    for (i, chunk) in data.chunks(3).enumerate() {
        let mut buf = [0u8; 3];
        buf[..chunk.len()].copy_from_slice(chunk);

        let indices = [
            buf[0] >> 2,
            ((buf[0] & 0x03) << 4) | (buf[1] >> 4),
            ((buf[1] & 0x0F) << 2) | (buf[2] >> 6),
            buf[2] & 0x3F,
        ];

        for (n, index) in indices.iter().enumerate() {
            if n <= chunk.len() {
                result.push(char::from(ALPHABET[usize::from(*index)]));
            } else {
                result.push('=');
            }
        }

        if (i + 1) % GROUPS_PER_LINE == 0 {
            result.push_str("\r\n");
        }
    }

    if !result.is_empty() && !result.ends_with("\r\n") {
        result.push_str("\r\n");
    }

    result
}
