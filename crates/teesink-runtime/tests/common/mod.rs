//! Shared test helpers: in-memory streams and scripted dispatchers.

#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use teesink_core::ports::{Delivery, DeliveryDispatcher, DispatchError, DisposeHook, Rejected};
use teesink_runtime::{StreamRedirector, StreamTarget};

/// Thread name used for presenter threads in tests.
pub const TEST_PRESENTER: &str = "test-presenter";

/// In-memory writer whose contents can be read back.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A stream context whose originals are in-memory buffers.
pub struct Streams {
    pub redirector: Arc<StreamRedirector>,
    pub out: Captured,
    pub err: Captured,
}

pub fn streams() -> Streams {
    let out = Captured::default();
    let err = Captured::default();
    let redirector = Arc::new(StreamRedirector::new(
        StreamTarget::new(out.clone()),
        StreamTarget::new(err.clone()),
    ));
    Streams {
        redirector,
        out,
        err,
    }
}

/// Records delivered texts in dispatch order.
#[derive(Default)]
pub struct RecordingDispatcher {
    delivered: Mutex<Vec<String>>,
}

impl RecordingDispatcher {
    pub fn texts(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn joined(&self) -> String {
        self.texts().concat()
    }
}

impl DeliveryDispatcher for RecordingDispatcher {
    fn dispatch(&self, delivery: Delivery) -> Result<(), Rejected> {
        self.delivered.lock().unwrap().push(delivery.text);
        Ok(())
    }

    fn on_dispose(&self, _hook: DisposeHook) {}
}

/// Refuses every delivery, as a presenter that can no longer be scheduled.
#[derive(Default)]
pub struct RefusingDispatcher;

impl DeliveryDispatcher for RefusingDispatcher {
    fn dispatch(&self, delivery: Delivery) -> Result<(), Rejected> {
        Err(Rejected {
            delivery,
            reason: DispatchError::Disposed,
        })
    }

    fn on_dispose(&self, _hook: DisposeHook) {}
}
