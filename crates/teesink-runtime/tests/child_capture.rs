//! Capturing a child process's piped output into a relay.

#![cfg(unix)]

mod common;

use common::{RecordingDispatcher, streams};
use std::process::Stdio;
use std::sync::Arc;
use teesink_runtime::{TextRelay, capture_child};
use tokio::process::Command;

#[tokio::test]
async fn test_child_output_is_relayed_per_line() {
    let s = streams();
    let recorder = Arc::new(RecordingDispatcher::default());
    let relay = TextRelay::builder(recorder.clone())
        .streams(s.redirector)
        .terminator("\n")
        .build();

    let mut child = Command::new("sh")
        .arg("-c")
        .arg("echo out; echo err 1>&2; printf tail")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    let handles = capture_child(&mut child, &relay).unwrap();
    child.wait().await.unwrap();
    handles.join().await;
    relay.close();

    let mut texts = recorder.texts();
    texts.sort();
    assert_eq!(texts, vec!["err\n", "out\n", "tail"]);
}

#[tokio::test]
async fn test_unpiped_child_is_rejected() {
    let s = streams();
    let relay = TextRelay::builder(Arc::new(RecordingDispatcher::default()))
        .streams(s.redirector)
        .build();

    let mut child = Command::new("true")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let err = capture_child(&mut child, &relay).unwrap_err();
    assert!(err.to_string().contains("not piped"));
    child.wait().await.unwrap();
}
