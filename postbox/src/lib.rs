//! Integration testing for flows that send mail.
//!
//! A test starts a [`MailTestHarness`], triggers a flow by name, and then
//! inspects what the capture server received with the checks in
//! [`assertions`].

pub mod assertions;
pub mod flow;
pub mod flows;
mod harness;

pub use flow::{Event, Flow, FlowError, FlowRegistry};
pub use harness::MailTestHarness;
pub use postbox_common::{Address, CapturedMessage, Part, RecipientType, config};
