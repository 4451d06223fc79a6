//! Shared setup for the mail flow integration tests.

use std::path::PathBuf;

use postbox::MailTestHarness;

pub const PAYLOAD: &str = "Welcome to UnitTesters.com";

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// A harness running the flows from the demo configuration.
pub async fn demo_harness() -> MailTestHarness {
    MailTestHarness::from_config_file(fixture("mailserver-demo.config.ron"))
        .await
        .expect("Failed to start mail test harness")
}
