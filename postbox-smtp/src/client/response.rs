//! SMTP reply parsing.

use core::fmt::{self, Display, Formatter};

use super::error::{ClientError, Result};

/// A single line of a (possibly multi-line) reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub code: u16,
    /// `false` for `250-...` continuation lines.
    pub is_last: bool,
    pub message: String,
}

/// A complete SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// All lines of the reply joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// 2xx
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// 3xx, e.g. the 354 that invites message content.
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// 4xx or 5xx
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.code >= 400 && self.code < 600
    }

    /// Parses one reply line such as `250-SIZE 10000`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the line doesn't match SMTP format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let code = line
            .get(..3)
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| ClientError::ParseError(format!("Invalid reply line: '{line}'")))?;

        let (is_last, message) = match line.as_bytes().get(3) {
            None => (true, ""),
            Some(b' ') => (true, &line[4..]),
            Some(b'-') => (false, &line[4..]),
            Some(other) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{}'",
                    char::from(*other)
                )));
            }
        };

        Ok(ResponseLine {
            code,
            is_last,
            message: message.to_string(),
        })
    }

    /// Parses a complete reply from the front of `buffer`.
    ///
    /// Returns the reply and the number of bytes consumed, or `None` if the
    /// buffer does not yet hold a complete reply.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the reply is malformed.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut consumed = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(end) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let text = std::str::from_utf8(raw)?.trim_end_matches('\r');
            if text.is_empty() {
                continue;
            }

            let line = Self::parse_line(text)?;
            match code {
                Some(first) if first != line.code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {first}, got {}",
                        line.code
                    )));
                }
                _ => code = Some(line.code),
            }

            lines.push(line.message);
            if line.is_last {
                return Ok(code.map(|code| (Self::new(code, lines), consumed)));
            }
        }

        Ok(None)
    }
}

impl Display for Response {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} {}", self.code, self.message())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_single_line() {
        assert_eq!(
            Response::parse_line("220 capture.test ESMTP").unwrap(),
            ResponseLine {
                code: 220,
                is_last: true,
                message: "capture.test ESMTP".to_string(),
            }
        );
        assert!(Response::parse_line("22").is_err());
        assert!(Response::parse_line("250_OK").is_err());
    }

    #[test]
    fn test_parse_multi_line_response() {
        let data = b"250-capture.test\r\n250-SIZE 10000000\r\n250 HELP\r\n";
        let (response, consumed) = Response::parse_response(data).unwrap().unwrap();

        assert_eq!(response.code, 250);
        assert_eq!(response.lines, vec!["capture.test", "SIZE 10000000", "HELP"]);
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_parse_leaves_following_reply() {
        let data = b"250 OK\r\n221 Bye\r\n";
        let (response, consumed) = Response::parse_response(data).unwrap().unwrap();

        assert_eq!(response.code, 250);
        assert_eq!(consumed, 8);
    }

    #[test]
    fn test_parse_incomplete_response() {
        assert!(
            Response::parse_response(b"250-capture.test\r\n250-SIZE")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_classification() {
        assert!(Response::new(250, vec![]).is_success());
        assert!(Response::new(354, vec![]).is_intermediate());
        assert!(Response::new(550, vec![]).is_error());
        assert!(!Response::new(550, vec![]).is_success());
    }
}
