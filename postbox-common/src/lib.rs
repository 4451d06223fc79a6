pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod mime;

pub use tracing;

pub use crate::{
    message::{Address, CapturedMessage, RecipientType, render_addresses},
    mime::{AttachmentIndex, Part, PartBody},
};
