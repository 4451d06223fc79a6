//! One SMTP conversation with a client delivering to the capture server.

use std::{net::SocketAddr, sync::Arc};

use postbox_common::{
    CapturedMessage, config::DEFAULT_MAX_MESSAGE_SIZE, incoming, internal, outgoing,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};

use crate::{
    command::{Command, HeloVariant},
    store::CaptureStore,
};

/// Longest line read from a client, terminator included. Longer command
/// lines are answered with 500, longer content lines make DATA fail with 552.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Envelope of the transaction in progress.
#[derive(Debug, Default)]
struct Transaction {
    started: bool,
    sender: Option<String>,
    recipients: Vec<String>,
}

enum Line {
    Complete,
    TooLong,
    Eof,
}

enum DataOutcome {
    Complete(Vec<u8>),
    TooLarge,
    Disconnected,
}

pub struct Session<S> {
    stream: BufStream<S>,
    peer: SocketAddr,
    hostname: Arc<str>,
    store: CaptureStore,
    transaction: Transaction,
    max_message_size: usize,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: SocketAddr, hostname: Arc<str>, store: CaptureStore) -> Self {
        Self {
            stream: BufStream::new(stream),
            peer,
            hostname,
            store,
            transaction: Transaction::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    #[must_use]
    pub const fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    async fn reply(&mut self, code: u16, message: &str) -> std::io::Result<()> {
        outgoing!("[{}] {} {}", self.peer, code, message);

        self.stream
            .write_all(format!("{code} {message}\r\n").as_bytes())
            .await?;
        self.stream.flush().await
    }

    /// Reads one line into `line`, reading at most [`MAX_LINE_LENGTH`] bytes.
    ///
    /// The rest of an overlong line is read and discarded in bounded chunks.
    async fn read_line(&mut self, line: &mut Vec<u8>) -> std::io::Result<Line> {
        const LIMIT: u64 = MAX_LINE_LENGTH as u64;

        line.clear();
        if (&mut self.stream).take(LIMIT).read_until(b'\n', line).await? == 0 {
            return Ok(Line::Eof);
        }

        if line.ends_with(b"\n") || line.len() < MAX_LINE_LENGTH {
            return Ok(Line::Complete);
        }

        line.clear();
        loop {
            let read = (&mut self.stream).take(LIMIT).read_until(b'\n', line).await?;
            if read == 0 || line.ends_with(b"\n") {
                break;
            }
            line.clear();
        }
        line.clear();

        internal!(level = DEBUG, "[{}] Discarded overlong line", self.peer);
        Ok(Line::TooLong)
    }

    /// Runs the conversation until the client quits or disconnects.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from or writing to the client fails.
    pub async fn run(mut self) -> std::io::Result<()> {
        let greeting = format!("{} ESMTP postbox capture ready", self.hostname);
        self.reply(220, &greeting).await?;

        let mut line = Vec::with_capacity(512);

        loop {
            match self.read_line(&mut line).await? {
                Line::Complete => {}
                Line::TooLong => {
                    self.reply(500, "5.5.2 Error: line too long").await?;
                    continue;
                }
                Line::Eof => {
                    internal!("[{}] Client disconnected", self.peer);
                    return Ok(());
                }
            }

            let command = Command::try_from(line.as_slice());
            incoming!("[{}] {:?}", self.peer, command);

            match command {
                Ok(Command::Helo(variant)) => {
                    self.transaction = Transaction::default();
                    let id = match &variant {
                        HeloVariant::Ehlo(id) | HeloVariant::Helo(id) => id.clone(),
                    };
                    let message = format!("{} greets {id}", self.hostname);
                    self.reply(250, &message).await?;
                }
                Ok(Command::MailFrom(sender)) => {
                    if self.transaction.started {
                        self.reply(503, "5.5.1 Error: nested MAIL command").await?;
                    } else {
                        self.transaction.started = true;
                        self.transaction.sender = sender;
                        self.reply(250, "2.1.0 Ok").await?;
                    }
                }
                Ok(Command::RcptTo(recipient)) => {
                    if self.transaction.started {
                        self.transaction.recipients.push(recipient);
                        self.reply(250, "2.1.5 Ok").await?;
                    } else {
                        self.reply(503, "5.5.1 Error: need MAIL command").await?;
                    }
                }
                Ok(Command::Data) => {
                    if self.transaction.recipients.is_empty() {
                        self.reply(503, "5.5.1 Error: need RCPT command").await?;
                        continue;
                    }

                    self.reply(354, "End data with <CR><LF>.<CR><LF>").await?;

                    match self.read_data().await? {
                        DataOutcome::Complete(data) => {
                            let stored = self.deliver(data);
                            let message = format!("2.0.0 Ok: captured {stored} copies");
                            self.reply(250, &message).await?;
                        }
                        DataOutcome::TooLarge => {
                            self.transaction = Transaction::default();
                            self.reply(552, "5.3.4 Message size exceeds fixed limit")
                                .await?;
                        }
                        DataOutcome::Disconnected => {
                            internal!(
                                level = DEBUG,
                                "[{}] Client disconnected during DATA, nothing captured",
                                self.peer
                            );
                            return Ok(());
                        }
                    }
                }
                Ok(Command::Rset) => {
                    self.transaction = Transaction::default();
                    self.reply(250, "2.0.0 Ok").await?;
                }
                Ok(Command::Noop) => self.reply(250, "2.0.0 Ok").await?,
                Ok(Command::Quit) => {
                    self.reply(221, "2.0.0 Bye").await?;
                    return Ok(());
                }
                Ok(Command::Invalid(_)) | Err(_) => {
                    self.reply(500, "5.5.2 Error: command not recognized")
                        .await?;
                }
            }
        }
    }

    /// Reads dot-terminated message content, undoing dot-stuffing.
    async fn read_data(&mut self) -> std::io::Result<DataOutcome> {
        let mut data = Vec::new();
        let mut line = Vec::with_capacity(1024);
        let mut too_large = false;

        loop {
            match self.read_line(&mut line).await? {
                Line::Complete => {}
                Line::TooLong => {
                    too_large = true;
                    continue;
                }
                Line::Eof => return Ok(DataOutcome::Disconnected),
            }

            if line == b".\r\n" || line == b".\n" {
                break;
            }

            let content = line.strip_prefix(b".").unwrap_or(line.as_slice());
            if data.len() + content.len() > self.max_message_size {
                too_large = true;
            }

            if !too_large {
                data.extend_from_slice(content);
            }
        }

        Ok(if too_large {
            DataOutcome::TooLarge
        } else {
            DataOutcome::Complete(data)
        })
    }

    /// Stores one copy of the message per envelope recipient and resets the
    /// transaction.
    fn deliver(&mut self, data: Vec<u8>) -> usize {
        let transaction = std::mem::take(&mut self.transaction);
        let data: Arc<[u8]> = Arc::from(data);

        for recipient in &transaction.recipients {
            self.store.push(CapturedMessage::new(
                transaction.sender.clone(),
                recipient.clone(),
                Arc::clone(&data),
            ));
        }

        internal!(
            level = DEBUG,
            "[{}] Captured message from {:?} for {:?}",
            self.peer,
            transaction.sender,
            transaction.recipients
        );

        transaction.recipients.len()
    }
}
