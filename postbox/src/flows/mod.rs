//! Flow kinds that can be declared in configuration.

mod mail_sender;

pub use mail_sender::MailSenderFlow;
