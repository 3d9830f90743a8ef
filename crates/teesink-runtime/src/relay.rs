//! Text relay: the sink between writers and the presenter.
//!
//! Writers push bytes from any thread. Bytes accumulate in a [`LineBuffer`]
//! until a line completes or the relay is flushed; the drained text is then
//! handed to a [`DeliveryDispatcher`] that appends it on the presenter's
//! thread. Dispatch never blocks the writer.
//!
//! If a delivery cannot be scheduled, or the presenter fails to append it,
//! the text is written to the *original* standard stream of the redirector,
//! never to the redirected one.
//!
//! # Lifecycle
//!
//! ```text
//! Open ──close()──▶ Closing ──▶ Closed
//! ```
//!
//! `close()` flushes what is buffered, restores the standard streams if this
//! relay redirected them, and rejects all later writes with
//! [`SinkError::Closed`].

use crate::redirect::{
    RedirectToken, SharedWrite, StreamKind, StreamRedirector, StreamTarget, get_stream_redirector,
};
use std::cell::Cell;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use teesink_core::SinkError;
use teesink_core::capacity::{DEFAULT_MAX_CHARS, resolve_max_chars};
use teesink_core::line_buffer::{LINE_SEPARATOR, LineBuffer};
use teesink_core::ports::{Delivery, DeliveryDispatcher, LimitProvider, Rejected};
use teesink_core::settings::SharedSettings;
use tracing::{debug, warn};

thread_local! {
    /// Set while this thread is reporting a relay problem.
    static REPORTING: Cell<bool> = const { Cell::new(false) };
}

/// Run `f` with the reporting flag set.
///
/// Log events emitted inside may be routed back into a relay by a redirected
/// log writer. Such writes bypass the buffer and go straight to the original
/// stream, so reporting can never recurse.
fn reporting<R>(f: impl FnOnce() -> R) -> R {
    struct Reset(bool);

    impl Drop for Reset {
        fn drop(&mut self) {
            REPORTING.set(self.0);
        }
    }

    let _reset = Reset(REPORTING.replace(true));
    f()
}

struct Pending {
    buffer: LineBuffer,
    /// Whether any buffered byte came from stderr; decides the fallback stream.
    from_stderr: bool,
}

enum RelayState {
    Open(Pending),
    Closing,
    Closed,
}

/// Line-buffered sink delivering text to a presenter.
pub struct TextRelay {
    state: Mutex<RelayState>,
    terminator: u8,
    dispatcher: Arc<dyn DeliveryDispatcher>,
    limit: RwLock<Arc<dyn LimitProvider>>,
    streams: Arc<StreamRedirector>,
    redirect_token: Mutex<Option<RedirectToken>>,
    rejected: AtomicUsize,
}

impl TextRelay {
    /// Start building a relay that delivers through `dispatcher`.
    pub fn builder(dispatcher: Arc<dyn DeliveryDispatcher>) -> TextRelayBuilder {
        TextRelayBuilder::new(dispatcher)
    }

    /// Write one character as standard output.
    pub fn write_char(&self, c: char) -> Result<(), SinkError> {
        let mut encoded = [0u8; 4];
        self.write_bytes(StreamKind::Stdout, c.encode_utf8(&mut encoded).as_bytes())
    }

    /// Write `s` as standard output.
    pub fn write_str(&self, s: &str) -> Result<(), SinkError> {
        self.write_bytes(StreamKind::Stdout, s.as_bytes())
    }

    /// Write raw bytes attributed to `kind`.
    ///
    /// Every completed line is dispatched as its own delivery.
    pub fn write_bytes(&self, kind: StreamKind, bytes: &[u8]) -> Result<(), SinkError> {
        if REPORTING.get() {
            return self.write_direct(kind, bytes);
        }

        let max_chars = bytes.contains(&self.terminator).then(|| self.max_chars());

        let mut rejected = Vec::new();
        {
            let mut state = self.state();
            let RelayState::Open(pending) = &mut *state else {
                return Err(SinkError::Closed);
            };

            for &byte in bytes {
                pending.from_stderr |= kind == StreamKind::Stderr;
                if pending.buffer.append(byte) {
                    let text = pending.buffer.drain_and_reset();
                    let from_stderr = std::mem::take(&mut pending.from_stderr);
                    let max_chars = max_chars.unwrap_or(DEFAULT_MAX_CHARS);
                    if let Err(r) = self.dispatch(text, from_stderr, max_chars) {
                        rejected.push(r);
                    }
                }
            }
        }

        self.fall_back(rejected);
        Ok(())
    }

    /// Deliver whatever is buffered.
    pub fn flush(&self) -> Result<(), SinkError> {
        if REPORTING.get() {
            return if self.is_closed() {
                Err(SinkError::Closed)
            } else {
                Ok(())
            };
        }

        if self.buffered_len()? == 0 {
            return Ok(());
        }
        let max_chars = self.max_chars();

        let rejected = {
            let mut state = self.state();
            let RelayState::Open(pending) = &mut *state else {
                return Err(SinkError::Closed);
            };
            let text = pending.buffer.drain_and_reset();
            let from_stderr = std::mem::take(&mut pending.from_stderr);
            self.dispatch(text, from_stderr, max_chars).err()
        };

        self.fall_back(rejected);
        Ok(())
    }

    /// Flush, restore redirected streams and stop accepting writes.
    ///
    /// Only the first call has any effect. Deliveries already queued are not
    /// cancelled.
    pub fn close(&self) {
        if self.is_closed() {
            return;
        }
        let max_chars = self.max_chars();

        let mut pending = {
            let mut state = self.state();
            match std::mem::replace(&mut *state, RelayState::Closing) {
                RelayState::Open(pending) => pending,
                other => {
                    *state = other;
                    return;
                }
            }
        };

        let text = pending.buffer.finish();
        let rejected = self.dispatch(text, pending.from_stderr, max_chars).err();
        self.fall_back(rejected);

        self.reset_streams();

        *self.state() = RelayState::Closed;
        reporting(|| debug!("Text relay closed"));
    }

    pub fn is_closed(&self) -> bool {
        !matches!(*self.state(), RelayState::Open(_))
    }

    /// Whether this relay currently holds a redirect of the standard streams.
    pub fn is_redirecting(&self) -> bool {
        self.token().is_some()
    }

    /// Bytes buffered and not yet delivered.
    pub fn buffered_len(&self) -> Result<usize, SinkError> {
        match &*self.state() {
            RelayState::Open(pending) => Ok(pending.buffer.len()),
            RelayState::Closing | RelayState::Closed => Err(SinkError::Closed),
        }
    }

    /// The capacity the next delivery will use. Read fresh on every call.
    pub fn max_chars(&self) -> usize {
        let provider = Arc::clone(&self.limit.read().unwrap_or_else(PoisonError::into_inner));
        reporting(|| resolve_max_chars(provider.as_ref()))
    }

    /// Replace the capacity source.
    pub fn set_limit(&self, provider: impl LimitProvider + 'static) {
        *self.limit.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(provider);
    }

    /// Deliveries that could not be scheduled and went to the original stream.
    pub fn rejected_deliveries(&self) -> usize {
        self.rejected.load(Ordering::Relaxed)
    }

    /// An `io::Write` handle attributing its bytes to `kind`.
    pub fn writer(self: &Arc<Self>, kind: StreamKind) -> RelayWriter {
        RelayWriter {
            relay: Arc::clone(self),
            kind,
        }
    }

    /// Give the standard streams back if this relay still holds them.
    /// Runs at most once per redirect.
    fn reset_streams(&self) {
        let token = self
            .redirect_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            reporting(|| self.streams.restore(token));
        }
    }

    fn token(&self) -> Option<RedirectToken> {
        *self
            .redirect_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand `text` to the dispatcher. Called with the state lock held, so it
    /// must not log.
    fn dispatch(&self, text: String, from_stderr: bool, max_chars: usize) -> Result<(), Rejected> {
        if text.is_empty() {
            return Ok(());
        }

        let kind = if from_stderr {
            StreamKind::Stderr
        } else {
            StreamKind::Stdout
        };
        let original = self.streams.original(kind);
        let fallback = Box::new(move |text: &str| original.write_best_effort(text.as_bytes()));

        self.dispatcher.dispatch(Delivery::new(text, max_chars, fallback))
    }

    /// Write rejected deliveries to their original streams. Called without
    /// the state lock.
    fn fall_back(&self, rejected: impl IntoIterator<Item = Rejected>) {
        for r in rejected {
            if self.rejected.fetch_add(1, Ordering::Relaxed) == 0 {
                reporting(|| {
                    warn!(
                        reason = %r.reason,
                        chars = r.delivery.text.chars().count(),
                        "Cannot schedule text for the presenter, writing to original stream"
                    );
                });
            }
            r.delivery.fall_back();
        }
    }

    fn write_direct(&self, kind: StreamKind, bytes: &[u8]) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        self.streams.original(kind).write_best_effort(bytes);
        Ok(())
    }
}

impl Drop for TextRelay {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for TextRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextRelay")
            .field("closed", &self.is_closed())
            .field("redirecting", &self.is_redirecting())
            .finish_non_exhaustive()
    }
}

/// Builder for [`TextRelay`].
pub struct TextRelayBuilder {
    dispatcher: Arc<dyn DeliveryDispatcher>,
    limit: Arc<dyn LimitProvider>,
    streams: Option<Arc<StreamRedirector>>,
    redirect: bool,
    terminator: String,
}

impl TextRelayBuilder {
    fn new(dispatcher: Arc<dyn DeliveryDispatcher>) -> Self {
        Self {
            dispatcher,
            limit: Arc::new(None::<usize>),
            streams: None,
            redirect: false,
            terminator: LINE_SEPARATOR.to_string(),
        }
    }

    /// Capacity source, queried on every delivery. Unset means the default.
    #[must_use]
    pub fn limit(mut self, provider: impl LimitProvider + 'static) -> Self {
        self.limit = Arc::new(provider);
        self
    }

    /// Take the capacity and redirect flag from shared settings. Later
    /// capacity updates are seen by the running relay.
    #[must_use]
    pub fn settings(mut self, settings: &SharedSettings) -> Self {
        self.redirect = settings.get().effective_redirect_streams();
        self.limit = Arc::new(settings.clone());
        self
    }

    /// Stream context providing the original streams and receiving the
    /// redirect. Defaults to the process-wide redirector.
    #[must_use]
    pub fn streams(mut self, streams: Arc<StreamRedirector>) -> Self {
        self.streams = Some(streams);
        self
    }

    /// Whether the relay takes over standard output and error.
    #[must_use]
    pub const fn redirect(mut self, redirect: bool) -> Self {
        self.redirect = redirect;
        self
    }

    /// Line terminator; only its last character is matched.
    #[must_use]
    pub fn terminator(mut self, terminator: impl Into<String>) -> Self {
        self.terminator = terminator.into();
        self
    }

    pub fn build(self) -> Arc<TextRelay> {
        let buffer = LineBuffer::with_terminator(&self.terminator);
        let relay = Arc::new(TextRelay {
            state: Mutex::new(RelayState::Open(Pending {
                buffer,
                from_stderr: false,
            })),
            terminator: self.terminator.as_bytes().last().copied().unwrap_or(b'\n'),
            dispatcher: Arc::clone(&self.dispatcher),
            limit: RwLock::new(self.limit),
            streams: self.streams.unwrap_or_else(get_stream_redirector),
            redirect_token: Mutex::new(None),
            rejected: AtomicUsize::new(0),
        });

        if self.redirect {
            // The presenter going away gives the streams back even if the
            // relay is never closed.
            let weak: Weak<TextRelay> = Arc::downgrade(&relay);
            self.dispatcher.on_dispose(Box::new(move || {
                if let Some(relay) = weak.upgrade() {
                    relay.reset_streams();
                }
            }));

            let token = relay.streams.redirect(
                RedirectWriter::target(&relay, StreamKind::Stdout),
                RedirectWriter::target(&relay, StreamKind::Stderr),
            );
            *relay
                .redirect_token
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = token;
        }

        relay
    }
}

/// `io::Write` adapter over a relay, tagged with a stream kind.
#[derive(Debug, Clone)]
pub struct RelayWriter {
    relay: Arc<TextRelay>,
    kind: StreamKind,
}

impl RelayWriter {
    pub const fn kind(&self) -> StreamKind {
        self.kind
    }
}

impl Write for RelayWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.relay.write_bytes(self.kind, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.relay.flush()?;
        Ok(())
    }
}

/// What the redirector holds while this relay owns the standard streams.
///
/// The relay is referenced weakly: the redirector never keeps a relay alive,
/// and once the relay is gone writes land on the original stream.
struct RedirectWriter {
    relay: Weak<TextRelay>,
    kind: StreamKind,
    original: StreamTarget,
}

impl RedirectWriter {
    fn target(relay: &Arc<TextRelay>, kind: StreamKind) -> StreamTarget {
        StreamTarget::shared(Self {
            relay: Arc::downgrade(relay),
            kind,
            original: relay.streams.original(kind),
        })
    }
}

impl SharedWrite for RedirectWriter {
    fn write_shared(&self, buf: &[u8]) -> io::Result<()> {
        match self.relay.upgrade() {
            Some(relay) => relay.write_bytes(self.kind, buf).map_err(io::Error::from),
            None => {
                self.original.write_best_effort(buf);
                Ok(())
            }
        }
    }

    fn flush_shared(&self) -> io::Result<()> {
        match self.relay.upgrade() {
            Some(relay) => relay.flush().map_err(io::Error::from),
            None => Ok(()),
        }
    }
}
