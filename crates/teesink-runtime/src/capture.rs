//! Child process output capture.
//!
//! Child processes (often C/C++ tooling) may emit non-UTF8 bytes, so readers
//! forward raw chunks to the relay rather than reading lines as strings. The
//! relay's line buffer takes care of line boundaries, split multi-byte
//! characters and lossy decoding.

use crate::redirect::StreamKind;
use crate::relay::TextRelay;
use anyhow::{Result, anyhow};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::debug;

const READ_CHUNK: usize = 8 * 1024;

/// Forward everything read from `stream` into `relay`, tagged as `kind`.
///
/// The task ends on EOF, on a read error, or when the relay is closed.
/// Whatever is left in the relay's buffer at EOF is flushed.
pub fn spawn_stream_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    kind: StreamKind,
    relay: Arc<TextRelay>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = stream;
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            match stream.read(&mut buf).await {
                Ok(0) => {
                    let _ = relay.flush();
                    break;
                }
                Ok(n) => {
                    if let Err(e) = relay.write_bytes(kind, &buf[..n]) {
                        debug!(stream = %kind, error = %e, "capture reader exiting, relay closed");
                        return;
                    }
                }
                Err(e) => {
                    debug!(stream = %kind, error = %e, "capture reader exiting due to read error");
                    break;
                }
            }
        }

        debug!(stream = %kind, "capture reader task exiting");
    })
}

/// Readers attached to a child's output pipes.
#[derive(Debug)]
pub struct CaptureHandles {
    pub stdout: JoinHandle<()>,
    pub stderr: JoinHandle<()>,
}

impl CaptureHandles {
    /// Wait until both pipes have been drained.
    pub async fn join(self) {
        let _ = self.stdout.await;
        let _ = self.stderr.await;
    }
}

/// Attach readers to both piped streams of `child`.
///
/// The child must have been spawned with `Stdio::piped()` for stdout and
/// stderr.
pub fn capture_child(child: &mut Child, relay: &Arc<TextRelay>) -> Result<CaptureHandles> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("Child stdout is not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("Child stderr is not piped"))?;

    debug!(pid = ?child.id(), "Capturing child output");

    Ok(CaptureHandles {
        stdout: spawn_stream_reader(stdout, StreamKind::Stdout, Arc::clone(relay)),
        stderr: spawn_stream_reader(stderr, StreamKind::Stderr, Arc::clone(relay)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use teesink_core::ports::{Delivery, DeliveryDispatcher, DisposeHook, Rejected};

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl DeliveryDispatcher for Collect {
        fn dispatch(&self, delivery: Delivery) -> Result<(), Rejected> {
            self.0.lock().unwrap().push(delivery.text);
            Ok(())
        }

        fn on_dispose(&self, _hook: DisposeHook) {}
    }

    fn relay(collect: &Arc<Collect>) -> Arc<TextRelay> {
        let streams = Arc::new(crate::redirect::StreamRedirector::new(
            crate::redirect::StreamTarget::new(std::io::sink()),
            crate::redirect::StreamTarget::new(std::io::sink()),
        ));
        TextRelay::builder(collect.clone())
            .streams(streams)
            .terminator("\n")
            .build()
    }

    #[tokio::test]
    async fn test_reader_splits_lines_and_flushes_tail() {
        let collect = Arc::new(Collect::default());
        let relay = relay(&collect);

        let input: &'static [u8] = b"first\nsecond\nno newline";
        spawn_stream_reader(input, StreamKind::Stdout, Arc::clone(&relay))
            .await
            .unwrap();

        assert_eq!(
            *collect.0.lock().unwrap(),
            vec!["first\n", "second\n", "no newline"]
        );
    }

    #[tokio::test]
    async fn test_reader_decodes_invalid_utf8_lossily() {
        let collect = Arc::new(Collect::default());
        let relay = relay(&collect);

        let input: &'static [u8] = b"bad \xFF byte\n";
        spawn_stream_reader(input, StreamKind::Stderr, Arc::clone(&relay))
            .await
            .unwrap();

        assert_eq!(*collect.0.lock().unwrap(), vec!["bad \u{FFFD} byte\n"]);
    }

    #[tokio::test]
    async fn test_reader_stops_when_relay_closed() {
        let collect = Arc::new(Collect::default());
        let relay = relay(&collect);
        relay.close();

        let input: &'static [u8] = b"ignored\n";
        spawn_stream_reader(input, StreamKind::Stdout, Arc::clone(&relay))
            .await
            .unwrap();

        assert!(collect.0.lock().unwrap().is_empty());
    }
}
