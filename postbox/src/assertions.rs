//! Assertions over captured messages.
//!
//! Every check compares against a literal and reports the first mismatch it
//! finds. Nothing is cached between checks: each one decodes the message
//! again.
//!
//! ```no_run
//! use postbox::assertions::{expect_count, expect_that, for_each_message};
//! # fn check(messages: &[postbox_common::CapturedMessage]) -> Result<(), postbox::assertions::AssertionError> {
//! expect_count(messages, 2)?;
//! for_each_message(messages, |message| {
//!     expect_that(message)
//!         .to("to@example.com")?
//!         .cc("cc@example.com")?
//!         .subject("Welcome to UT")?
//!         .body("Welcome to UnitTesters.com")?;
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

use postbox_common::{
    AttachmentIndex, CapturedMessage, Part, RecipientType, error::DecodeError, render_addresses,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssertionError {
    #[error("{field}: expected '{expected}', found '{actual}'")]
    Mismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: DecodeError,
    },

    #[error("Expected an attachment named '{0}'")]
    MissingAttachment(String),

    #[error("Did not expect an attachment named '{0}'")]
    UnexpectedAttachment(String),

    #[error("Expected {expected} messages, received {actual}")]
    Count { expected: usize, actual: usize },

    /// A check failed for one message of a sequence.
    #[error("Message {index}: {source}")]
    Message {
        index: usize,
        #[source]
        source: Box<AssertionError>,
    },
}

impl AssertionError {
    fn mismatch(field: impl Into<String>, expected: &str, actual: &str) -> Self {
        Self::Mismatch {
            field: field.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    fn decode(context: impl Into<String>) -> impl FnOnce(DecodeError) -> Self {
        let context = context.into();
        move |source| Self::Decode { context, source }
    }
}

/// Starts a chain of checks on `message`.
pub const fn expect_that(message: &CapturedMessage) -> MessageAssert<'_> {
    MessageAssert { message }
}

/// Checks on a single captured message.
#[derive(Debug, Clone, Copy)]
pub struct MessageAssert<'a> {
    message: &'a CapturedMessage,
}

impl MessageAssert<'_> {
    /// Compares the rendered recipients of `kind` with `expected`, e.g.
    /// `"a@example.com, Bob <b@example.com>"`.
    ///
    /// # Errors
    ///
    /// Returns [`AssertionError::Mismatch`] if the rendering differs.
    pub fn recipients(&self, kind: RecipientType, expected: &str) -> Result<&Self, AssertionError> {
        let addresses = self
            .message
            .recipients(kind)
            .map_err(AssertionError::decode(kind.to_string()))?;
        let actual = render_addresses(&addresses);

        if actual == expected {
            Ok(self)
        } else {
            Err(AssertionError::mismatch(kind.to_string(), expected, &actual))
        }
    }

    /// # Errors
    ///
    /// Returns [`AssertionError::Mismatch`] if the To recipients differ.
    pub fn to(&self, expected: &str) -> Result<&Self, AssertionError> {
        self.recipients(RecipientType::To, expected)
    }

    /// # Errors
    ///
    /// Returns [`AssertionError::Mismatch`] if the Cc recipients differ.
    pub fn cc(&self, expected: &str) -> Result<&Self, AssertionError> {
        self.recipients(RecipientType::Cc, expected)
    }

    /// # Errors
    ///
    /// Returns [`AssertionError::Mismatch`] if the Bcc recipients differ.
    pub fn bcc(&self, expected: &str) -> Result<&Self, AssertionError> {
        self.recipients(RecipientType::Bcc, expected)
    }

    /// Exact comparison with the decoded subject. A message without a
    /// subject has the empty subject.
    ///
    /// # Errors
    ///
    /// Returns [`AssertionError::Mismatch`] if the subject differs.
    pub fn subject(&self, expected: &str) -> Result<&Self, AssertionError> {
        let actual = self
            .message
            .subject()
            .map_err(AssertionError::decode("Subject"))?
            .unwrap_or_default();

        if actual == expected {
            Ok(self)
        } else {
            Err(AssertionError::mismatch("Subject", expected, &actual))
        }
    }

    /// Compares the trimmed text body with `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`AssertionError::Decode`] if there is no decodable text
    /// body, or [`AssertionError::Mismatch`] if it differs.
    pub fn body(&self, expected: &str) -> Result<&Self, AssertionError> {
        let actual = self
            .message
            .body_text()
            .map_err(AssertionError::decode("body"))?;

        if actual.trim() == expected {
            Ok(self)
        } else {
            Err(AssertionError::mismatch("Body", expected, actual.trim()))
        }
    }

    /// Requires an attachment called `name` and returns checks on it.
    ///
    /// # Errors
    ///
    /// Returns [`AssertionError::MissingAttachment`] if there is none.
    pub fn attachment(&self, name: &str) -> Result<AttachmentAssert, AssertionError> {
        find_attachment(self.message, name)?
            .map(|part| AttachmentAssert {
                name: name.to_string(),
                part,
            })
            .ok_or_else(|| AssertionError::MissingAttachment(name.to_string()))
    }

    /// # Errors
    ///
    /// Returns [`AssertionError::UnexpectedAttachment`] if an attachment
    /// called `name` exists.
    pub fn no_attachment(&self, name: &str) -> Result<&Self, AssertionError> {
        match find_attachment(self.message, name)? {
            Some(_) => Err(AssertionError::UnexpectedAttachment(name.to_string())),
            None => Ok(self),
        }
    }
}

/// Checks on one attachment.
#[derive(Debug, Clone)]
pub struct AttachmentAssert {
    name: String,
    part: Part,
}

impl AttachmentAssert {
    pub const fn part(&self) -> &Part {
        &self.part
    }

    /// # Errors
    ///
    /// Returns [`AssertionError::Mismatch`] unless the attachment's
    /// Content-Type starts with `prefix`.
    pub fn content_type_starts_with(&self, prefix: &str) -> Result<&Self, AssertionError> {
        let actual = self.part.content_type();

        if actual.starts_with(prefix) {
            Ok(self)
        } else {
            Err(AssertionError::mismatch(
                format!("Content-Type of {}", self.name),
                prefix,
                actual,
            ))
        }
    }

    /// Compares the trimmed decoded content with `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`AssertionError::Decode`] if the content is not text in its
    /// declared charset, or [`AssertionError::Mismatch`] if it differs.
    pub fn content(&self, expected: &str) -> Result<&Self, AssertionError> {
        let actual = self
            .part
            .text()
            .map_err(AssertionError::decode(format!("attachment {}", self.name)))?;

        if actual.trim() == expected {
            Ok(self)
        } else {
            Err(AssertionError::mismatch(
                format!("Content of {}", self.name),
                expected,
                actual.trim(),
            ))
        }
    }
}

/// Looks up the attachment called `name`, walking the whole part tree.
///
/// A missing attachment is `Ok(None)`.
///
/// # Errors
///
/// Returns [`AssertionError::Decode`] if the message cannot be decoded.
pub fn find_attachment(
    message: &CapturedMessage,
    name: &str,
) -> Result<Option<Part>, AssertionError> {
    let root = message
        .content()
        .map_err(AssertionError::decode("message content"))?;

    Ok(AttachmentIndex::build(&root).get(name).cloned())
}

/// # Errors
///
/// Returns [`AssertionError::Count`] unless there are exactly `expected`
/// messages.
pub const fn expect_count(
    messages: &[CapturedMessage],
    expected: usize,
) -> Result<(), AssertionError> {
    if messages.len() == expected {
        Ok(())
    } else {
        Err(AssertionError::Count {
            expected,
            actual: messages.len(),
        })
    }
}

/// Runs `check` on every message in order, stopping at the first failure.
///
/// # Errors
///
/// Returns [`AssertionError::Message`] wrapping the first failure, tagged
/// with the index of the message it failed on.
pub fn for_each_message<F>(messages: &[CapturedMessage], mut check: F) -> Result<(), AssertionError>
where
    F: FnMut(&CapturedMessage) -> Result<(), AssertionError>,
{
    messages.iter().enumerate().try_for_each(|(index, message)| {
        check(message).map_err(|source| AssertionError::Message {
            index,
            source: Box::new(source),
        })
    })
}
