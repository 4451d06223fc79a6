use core::fmt::{self, Display, Formatter};

use mailparse::MailAddr;

#[derive(PartialEq, PartialOrd, Eq, Hash, Debug)]
pub enum HeloVariant {
    Ehlo(String),
    Helo(String),
}

impl Display for HeloVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ehlo(_) => "EHLO",
            Self::Helo(_) => "HELO",
        })
    }
}

/// A command line received by the capture server.
#[derive(Eq, PartialEq, Debug)]
pub enum Command {
    Helo(HeloVariant),
    /// If this is `None`, then it should be assumed this is the `null sender`, or `null reverse-path`,
    /// from [RFC-5321](https://www.ietf.org/rfc/rfc5321.txt).
    MailFrom(Option<String>),
    RcptTo(String),
    Data,
    Rset,
    Noop,
    Quit,
    Invalid(String),
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(v @ (HeloVariant::Ehlo(id) | HeloVariant::Helo(id))) => {
                write!(fmt, "{v} {id}")
            }
            Self::MailFrom(from) => write!(fmt, "MAIL FROM:<{}>", from.as_deref().unwrap_or("")),
            Self::RcptTo(rcpt) => write!(fmt, "RCPT TO:<{rcpt}>"),
            Self::Data => fmt.write_str("DATA"),
            Self::Rset => fmt.write_str("RSET"),
            Self::Noop => fmt.write_str("NOOP"),
            Self::Quit => fmt.write_str("QUIT"),
            Self::Invalid(s) => fmt.write_str(s),
        }
    }
}

/// Extracts the mailbox from a `<path>` argument, dropping any ESMTP
/// parameters that follow it.
fn path_argument(argument: &str) -> &str {
    let argument = argument.trim();

    if argument.starts_with('<') {
        argument
            .find('>')
            .map_or(argument, |end| &argument[..=end])
    } else {
        argument.split_whitespace().next().unwrap_or_default()
    }
}

fn parse_mailbox(argument: &str) -> Result<Option<String>, String> {
    let path = path_argument(argument);

    // Handle NULL sender explicitly, as mailparse doesn't tend to like this
    if path == "<>" {
        return Ok(None);
    }

    let addresses = mailparse::addrparse(path).map_err(|err| err.to_string())?;
    match addresses.first() {
        Some(MailAddr::Single(single)) => Ok(Some(single.addr.clone())),
        Some(MailAddr::Group(_)) => Err(format!("Group address not allowed: {path}")),
        None => Ok(None),
    }
}

impl TryFrom<&str> for Command {
    type Error = Self;

    fn try_from(command: &str) -> Result<Self, Self::Error> {
        let comm = command.to_ascii_uppercase();
        let comm = comm.trim();

        if comm.starts_with("MAIL FROM:") {
            parse_mailbox(&command.trim()[10..]).map_or_else(
                |err| Err(Self::Invalid(err)),
                |from| Ok(Self::MailFrom(from)),
            )
        } else if comm.starts_with("RCPT TO:") {
            match parse_mailbox(&command.trim()[8..]) {
                Ok(Some(to)) => Ok(Self::RcptTo(to)),
                Ok(None) => Err(Self::Invalid(format!("Expected recipient in {command}"))),
                Err(err) => Err(Self::Invalid(err)),
            }
        } else if comm.starts_with("EHLO") || comm.starts_with("HELO") {
            match command.trim().split_once(' ') {
                None => Err(Self::Invalid(format!("Expected hostname in {comm}"))),
                Some((_, host)) if comm.starts_with('H') => {
                    Ok(Self::Helo(HeloVariant::Helo(host.trim().to_string())))
                }
                Some((_, host)) => Ok(Self::Helo(HeloVariant::Ehlo(host.trim().to_string()))),
            }
        } else {
            match comm {
                "DATA" => Ok(Self::Data),
                "RSET" => Ok(Self::Rset),
                "QUIT" => Ok(Self::Quit),
                noop if noop == "NOOP" || noop.starts_with("NOOP ") => Ok(Self::Noop),
                _ => Err(Self::Invalid(command.trim().to_owned())),
            }
        }
    }
}

impl TryFrom<&[u8]> for Command {
    type Error = Self;

    fn try_from(command: &[u8]) -> Result<Self, Self::Error> {
        std::str::from_utf8(command).map_or(
            Err(Self::Invalid("Unable to interpret command".to_string())),
            Self::try_from,
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_helo() {
        assert_eq!(
            Command::try_from("EHLO client.example.com\r\n"),
            Ok(Command::Helo(HeloVariant::Ehlo(
                "client.example.com".to_string()
            )))
        );
        assert_eq!(
            Command::try_from("helo client"),
            Ok(Command::Helo(HeloVariant::Helo("client".to_string())))
        );
        assert!(Command::try_from("EHLO").is_err());
    }

    #[test]
    fn test_mail_from() {
        assert_eq!(
            Command::try_from("MAIL FROM:<sender@example.com>"),
            Ok(Command::MailFrom(Some("sender@example.com".to_string())))
        );
        assert_eq!(
            Command::try_from("mail from:<sender@example.com> SIZE=1024"),
            Ok(Command::MailFrom(Some("sender@example.com".to_string())))
        );
        assert_eq!(Command::try_from("MAIL FROM:<>"), Ok(Command::MailFrom(None)));
    }

    #[test]
    fn test_rcpt_to() {
        assert_eq!(
            Command::try_from("RCPT TO:<to@example.com>"),
            Ok(Command::RcptTo("to@example.com".to_string()))
        );
        assert!(Command::try_from("RCPT TO:<>").is_err());
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(Command::try_from("DATA"), Ok(Command::Data));
        assert_eq!(Command::try_from("rset"), Ok(Command::Rset));
        assert_eq!(Command::try_from("NOOP"), Ok(Command::Noop));
        assert_eq!(Command::try_from("QUIT\r\n"), Ok(Command::Quit));
        assert_eq!(
            Command::try_from("VRFY user"),
            Err(Command::Invalid("VRFY user".to_string()))
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Command::MailFrom(Some("a@example.com".to_string())).to_string(),
            "MAIL FROM:<a@example.com>"
        );
        assert_eq!(
            Command::Helo(HeloVariant::Ehlo("client".to_string())).to_string(),
            "EHLO client"
        );
    }
}
