//! Error types for the postbox-common crate.
//!
//! Decoding errors come from reading captured messages, configuration errors
//! from loading the RON configuration file.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors that can occur while decoding a captured message.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The message, one of its headers, or one of its parts is malformed.
    #[error("Malformed message: {0}")]
    Malformed(#[from] mailparse::MailParseError),

    /// The part declares a charset we cannot decode, or the bytes are not
    /// valid in that charset.
    #[error("Unable to decode content as {charset}")]
    Charset { charset: String },

    /// The message has no part that could serve as a text body.
    #[error("Message has no text body")]
    NoTextBody,

    /// Text was requested from a multipart container.
    #[error("Part is a multipart container, not a single part")]
    NotSinglePart,
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid RON for the expected shape.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// No configuration file could be located.
    #[error("No configuration file found. Tried:\n{0}")]
    NotFound(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;

    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::Charset {
            charset: "x-unknown".to_string(),
        };
        assert_eq!(err.to_string(), "Unable to decode content as x-unknown");
        assert_eq!(DecodeError::NoTextBody.to_string(), "Message has no text body");
    }

    #[test]
    fn test_config_error_source_chain() {
        let err = ConfigError::Read {
            path: PathBuf::from("/nonexistent/postbox.config.ron"),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };

        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "Failed to read config from /nonexistent/postbox.config.ron: not found"
        );
    }
}
