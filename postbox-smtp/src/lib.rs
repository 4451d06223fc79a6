//! The capture side of a mail test: an SMTP server that stores whatever is
//! delivered to it, plus the SMTP client flows use to deliver.

pub mod client;
pub mod command;
mod server;
mod session;
mod store;

pub use server::{CaptureError, CaptureServer};
pub use session::MAX_LINE_LENGTH;
pub use store::CaptureStore;
