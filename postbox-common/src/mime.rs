//! MIME part tree of a captured message and the attachment index built from
//! it.

use ahash::AHashMap;
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};

use crate::error::DecodeError;

/// Content of a part: either bytes, or a container of further parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartBody {
    /// Body bytes with the transfer encoding already removed.
    Single(Vec<u8>),
    Multipart(Vec<Part>),
}

/// One node of a message's MIME tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    content_type: String,
    mimetype: String,
    charset: String,
    filename: Option<String>,
    attachment: bool,
    body: PartBody,
}

impl Part {
    /// Converts a parsed message (or sub-part) into an owned tree.
    ///
    /// # Errors
    ///
    /// Returns an error if a transfer encoding cannot be decoded.
    pub fn from_mail(mail: &ParsedMail<'_>) -> Result<Self, DecodeError> {
        let disposition = mail.get_content_disposition();
        let filename = disposition
            .params
            .get("filename")
            .or_else(|| mail.ctype.params.get("name"))
            .cloned();

        let content_type = mail.headers.get_first_value("Content-Type").map_or_else(
            || format!("{}; charset={}", mail.ctype.mimetype, mail.ctype.charset),
            |value| value.trim().to_string(),
        );

        let body = if mail.ctype.mimetype.starts_with("multipart/") {
            PartBody::Multipart(
                mail.subparts
                    .iter()
                    .map(Self::from_mail)
                    .collect::<Result<_, _>>()?,
            )
        } else {
            PartBody::Single(mail.get_body_raw()?)
        };

        Ok(Self {
            content_type,
            mimetype: mail.ctype.mimetype.clone(),
            charset: mail.ctype.charset.clone(),
            attachment: disposition.disposition == DispositionType::Attachment,
            filename,
            body,
        })
    }

    /// The full `Content-Type` value, parameters included.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The bare media type, e.g. `text/plain`.
    #[must_use]
    pub fn mimetype(&self) -> &str {
        &self.mimetype
    }

    #[must_use]
    pub fn charset(&self) -> &str {
        &self.charset
    }

    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    #[must_use]
    pub const fn body(&self) -> &PartBody {
        &self.body
    }

    #[must_use]
    pub const fn is_multipart(&self) -> bool {
        matches!(self.body, PartBody::Multipart(_))
    }

    /// Sub-parts of a container; empty for single parts.
    #[must_use]
    pub fn subparts(&self) -> &[Self] {
        match &self.body {
            PartBody::Multipart(parts) => parts,
            PartBody::Single(_) => &[],
        }
    }

    /// The decoded bytes of a single part.
    #[must_use]
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.body {
            PartBody::Single(bytes) => Some(bytes),
            PartBody::Multipart(_) => None,
        }
    }

    /// The content of a single part decoded with its declared charset.
    ///
    /// # Errors
    ///
    /// Returns an error for containers, unknown charsets, and bytes that are
    /// invalid in the declared charset.
    pub fn text(&self) -> Result<String, DecodeError> {
        let bytes = self.bytes().ok_or(DecodeError::NotSinglePart)?;

        let encoding = encoding_rs::Encoding::for_label(self.charset.as_bytes()).ok_or_else(
            || DecodeError::Charset {
                charset: self.charset.clone(),
            },
        )?;

        let (text, _, had_errors) = encoding.decode(bytes);
        if had_errors {
            return Err(DecodeError::Charset {
                charset: self.charset.clone(),
            });
        }

        Ok(text.into_owned())
    }

    /// First text part in document order that is not a named attachment.
    #[must_use]
    pub fn text_body(&self) -> Option<&Self> {
        match &self.body {
            PartBody::Multipart(parts) => parts.iter().find_map(Self::text_body),
            PartBody::Single(_) => (self.mimetype.starts_with("text/")
                && !self.attachment
                && self.filename.is_none())
            .then_some(self),
        }
    }
}

/// Filename to part mapping for one message.
///
/// Built by walking the whole part tree. Names are expected to be unique
/// within a message; when two parts share a name the one walked last wins.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AttachmentIndex<'a> {
    parts: AHashMap<&'a str, &'a Part>,
}

impl<'a> AttachmentIndex<'a> {
    #[must_use]
    pub fn build(root: &'a Part) -> Self {
        let mut index = Self::default();
        index.collect(root);
        index
    }

    fn collect(&mut self, part: &'a Part) {
        match &part.body {
            PartBody::Multipart(parts) => {
                for sub in parts {
                    self.collect(sub);
                }
            }
            PartBody::Single(_) => {
                if let Some(name) = part.filename() {
                    if self.parts.insert(name, part).is_some() {
                        tracing::debug!(name, "Duplicate attachment name, keeping the later part");
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'a Part> {
        self.parts.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Attachment names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&'a str> {
        let mut names: Vec<_> = self.parts.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
