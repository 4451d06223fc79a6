//! Triggers the demo flows against the capture server and checks what they
//! delivered.
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod support;

use std::time::Duration;

use postbox::{
    Event, FlowError, MailTestHarness, RecipientType,
    assertions::{expect_count, expect_that, find_attachment, for_each_message},
    config::{CaptureConfig, PostboxConfig},
};
use postbox_common::AttachmentIndex;
use pretty_assertions::assert_eq;
use support::{PAYLOAD, demo_harness, fixture};

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn test_mail_flow_delivers_to_and_cc() {
    let harness = demo_harness().await;

    harness
        .run_flow("subflow-mail-sender", &Event::new(PAYLOAD))
        .await
        .expect("Flow failed");

    let messages = harness.received_messages();
    expect_count(&messages, 2).unwrap();

    for_each_message(&messages, |message| {
        expect_that(message)
            .to("to@example.com")?
            .cc("cc@example.com")?
            .subject("Welcome to UT")?
            .body(PAYLOAD)?;
        Ok(())
    })
    .unwrap();

    harness.shutdown().await;
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn test_attachment_flow() {
    let harness = demo_harness().await;

    harness
        .run_flow("subflow-attachment-mail-sender", &Event::new(PAYLOAD))
        .await
        .expect("Flow failed");

    let messages = harness.received_messages();
    expect_count(&messages, 2).unwrap();

    for_each_message(&messages, |message| {
        expect_that(message)
            .to("to@example.com")?
            .cc("cc@example.com")?
            .subject("Welcome to UT")?
            .body(PAYLOAD)?
            .no_attachment("test2.txt")?;

        expect_that(message)
            .attachment("test.txt")?
            .content_type_starts_with("text/plain")?
            .content(PAYLOAD)?;
        Ok(())
    })
    .unwrap();

    assert!(find_attachment(&messages[0], "test2.txt").unwrap().is_none());

    harness.shutdown().await;
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn test_attachment_flow_non_ascii_payload() {
    let payload = "Bienvenue à UnitTesters.com ✓";
    let harness = demo_harness().await;

    harness
        .run_flow("subflow-attachment-mail-sender", &Event::new(payload))
        .await
        .expect("Flow failed");

    let messages = harness.received_messages();
    expect_count(&messages, 2).unwrap();

    for_each_message(&messages, |message| {
        expect_that(message).body(payload)?;
        expect_that(message)
            .attachment("test.txt")?
            .content_type_starts_with("text/plain")?
            .content(payload)?;
        Ok(())
    })
    .unwrap();

    harness.shutdown().await;
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn test_attachment_walk_is_repeatable() {
    let harness = demo_harness().await;

    harness
        .run_flow("subflow-attachment-mail-sender", &Event::new(PAYLOAD))
        .await
        .unwrap();

    let messages = harness.received_messages();
    let first = messages[0].content().unwrap();
    let second = messages[0].content().unwrap();

    let first_index = AttachmentIndex::build(&first);
    let second_index = AttachmentIndex::build(&second);
    assert_eq!(first_index.names(), vec!["test.txt"]);
    assert_eq!(first_index.names(), second_index.names());
    assert_eq!(first_index.get("test.txt"), second_index.get("test.txt"));

    harness.shutdown().await;
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn test_bcc_recipient_only_in_envelope() {
    let harness = demo_harness().await;

    harness
        .run_flow("subflow-audited-mail-sender", &Event::new(PAYLOAD))
        .await
        .unwrap();

    let messages = harness
        .wait_for_messages(2, Duration::from_secs(5))
        .await
        .unwrap();
    expect_count(&messages, 2).unwrap();

    let audit = messages
        .iter()
        .find(|message| message.delivered_to() == "audit@example.com")
        .expect("No copy delivered to the blind recipient");

    assert!(audit.header("Bcc").unwrap().is_none());
    expect_that(audit)
        .to("to@example.com")
        .unwrap()
        .cc("")
        .unwrap()
        .bcc("audit@example.com")
        .unwrap();

    let visible = messages
        .iter()
        .find(|message| message.delivered_to() == "to@example.com")
        .unwrap();
    assert!(visible.recipients(RecipientType::Bcc).unwrap().is_empty());

    harness.shutdown().await;
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn test_subject_from_event() {
    let harness = demo_harness().await;

    harness
        .run_flow(
            "subflow-mail-sender",
            &Event::new(PAYLOAD).with_property("subject", "Welcome back"),
        )
        .await
        .unwrap();

    for_each_message(&harness.received_messages(), |message| {
        expect_that(message).subject("Welcome back")?;
        Ok(())
    })
    .unwrap();

    harness.shutdown().await;
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn test_unknown_flow() {
    let harness = demo_harness().await;

    let err = harness
        .run_flow("subflow-does-not-exist", &Event::new(PAYLOAD))
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<FlowError>(),
        Some(FlowError::UnknownFlow(name)) if name == "subflow-does-not-exist"
    ));
    assert!(harness.received_messages().is_empty());

    harness.shutdown().await;
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn test_clear_between_runs() {
    let harness = demo_harness().await;

    harness
        .run_flow("subflow-mail-sender", &Event::new(PAYLOAD))
        .await
        .unwrap();
    harness.clear();

    harness
        .run_flow("subflow-attachment-mail-sender", &Event::new(PAYLOAD))
        .await
        .unwrap();

    let messages = harness.received_messages();
    expect_count(&messages, 2).unwrap();
    assert!(
        find_attachment(&messages[0], "test.txt")
            .unwrap()
            .is_some()
    );

    harness.shutdown().await;
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn test_port_already_in_use() {
    let first = demo_harness().await;

    let config = PostboxConfig {
        capture: CaptureConfig {
            port: first.capture_addr().port(),
            ..CaptureConfig::default()
        },
        flows: Vec::new(),
    };

    assert!(MailTestHarness::start(config).await.is_err());

    first.shutdown().await;
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn test_config_from_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("postbox.config.ron");
    std::fs::copy(fixture("mailserver-demo.config.ron"), &path).unwrap();

    let harness = MailTestHarness::from_config_file(&path).await.unwrap();
    assert_eq!(
        harness.flows().names(),
        vec![
            "subflow-attachment-mail-sender",
            "subflow-audited-mail-sender",
            "subflow-mail-sender",
        ]
    );

    harness.shutdown().await;
}

#[tokio::test]
async fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();

    assert!(
        MailTestHarness::from_config_file(dir.path().join("missing.ron"))
            .await
            .is_err()
    );
}
