use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use postbox_common::{incoming, outgoing};

use super::{
    error::{ClientError, Result},
    response::Response,
};

/// Initial size of the read buffer for SMTP responses.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// A plain-TCP SMTP client connection.
pub struct SmtpClient {
    stream: TcpStream,
    buffer: Vec<u8>,
    buffer_pos: usize,
    responses: Vec<Response>,
}

impl SmtpClient {
    /// Connects to `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;

        Ok(Self {
            stream,
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            responses: Vec::new(),
        })
    }

    /// Reads the initial server greeting (220 response).
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is invalid.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// Sends a raw command and reads the response.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        outgoing!("{}", command);
        self.stream
            .write_all(format!("{command}\r\n").as_bytes())
            .await?;
        self.read_response().await
    }

    /// Sends EHLO with the specified domain.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// Sends MAIL FROM; an empty `from` sends the null reverse-path.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// Sends RCPT TO command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// Sends DATA command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Sends the message content, dot-stuffed and terminated by a lone dot.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    pub async fn send_data(&mut self, data: &str) -> Result<Response> {
        outgoing!(level = DEBUG, "Sending {} bytes of message data", data.len());

        self.stream.write_all(&dot_stuff(data)).await?;
        self.stream.write_all(b".\r\n").await?;
        self.stream.flush().await?;

        self.read_response().await
    }

    /// Sends QUIT command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    /// Returns all responses received so far.
    #[must_use]
    pub fn responses(&self) -> &[Response] {
        &self.responses
    }

    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{}", response);
                self.responses.push(response.clone());

                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let n = self.stream.read(&mut self.buffer[self.buffer_pos..]).await?;
            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            self.buffer_pos += n;
        }
    }
}

/// Normalises line endings to CRLF, doubles leading dots, and makes sure the
/// content ends with CRLF so the terminating dot sits on its own line.
fn dot_stuff(data: &str) -> Vec<u8> {
    let mut stuffed = Vec::with_capacity(data.len() + 16);

    for line in data.lines() {
        if line.starts_with('.') {
            stuffed.push(b'.');
        }
        stuffed.extend_from_slice(line.as_bytes());
        stuffed.extend_from_slice(b"\r\n");
    }

    stuffed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_stuff() {
        assert_eq!(dot_stuff("a\r\n.b\n..c"), b"a\r\n..b\r\n...c\r\n");
        assert_eq!(dot_stuff("Hello"), b"Hello\r\n");
        assert_eq!(dot_stuff(""), b"");
    }
}
