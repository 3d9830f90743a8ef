//! Standard stream redirection.
//!
//! A [`StreamRedirector`] is an explicit context holding the original
//! standard output/error targets and, optionally, one installed redirect.
//! Code that wants its output to follow redirection writes through the
//! [`RedirectedStream`] handles returned by [`StreamRedirector::stdout`] and
//! [`StreamRedirector::stderr`], or plugs them into a `tracing` subscriber via
//! `with_writer`.
//!
//! A process-wide default instance is available through
//! [`get_stream_redirector`] for the outermost application boundary; tests
//! and libraries should construct their own.
//!
//! Redirection is best-effort: failures are logged and never returned to
//! the caller. When two sinks redirect in turn, the later one wins, and an
//! earlier sink's restore becomes a no-op instead of undoing the newer
//! redirect.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, error, warn};
use tracing_subscriber::fmt::MakeWriter;

/// Global stream redirector instance
static STREAM_REDIRECTOR: LazyLock<Arc<StreamRedirector>> =
    LazyLock::new(|| Arc::new(StreamRedirector::process()));

/// Get the process-wide stream redirector
pub fn get_stream_redirector() -> Arc<StreamRedirector> {
    STREAM_REDIRECTOR.clone()
}

/// Which standard stream a write belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A destination that synchronizes its own writes.
///
/// [`StreamTarget`] calls these without holding any lock of its own, so an
/// implementation may log or write back into a redirected stream.
pub trait SharedWrite: Send + Sync {
    fn write_shared(&self, buf: &[u8]) -> io::Result<()>;

    fn flush_shared(&self) -> io::Result<()>;
}

/// Plain writer behind a mutex.
struct Locked(Mutex<Box<dyn Write + Send>>);

impl Locked {
    fn lock(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SharedWrite for Locked {
    fn write_shared(&self, buf: &[u8]) -> io::Result<()> {
        self.lock().write_all(buf)
    }

    fn flush_shared(&self) -> io::Result<()> {
        self.lock().flush()
    }
}

/// Shareable output destination.
#[derive(Clone)]
pub struct StreamTarget {
    inner: Arc<dyn SharedWrite>,
}

impl StreamTarget {
    /// Wrap a plain writer; writes to it are serialized by a mutex.
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Locked(Mutex::new(Box::new(writer)))),
        }
    }

    /// Wrap a destination that does its own synchronization.
    pub fn shared(writer: impl SharedWrite + 'static) -> Self {
        Self {
            inner: Arc::new(writer),
        }
    }

    /// The process standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// The process standard error.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Whether both handles point at the same destination.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Write and flush `bytes`, ignoring any failure.
    pub fn write_best_effort(&self, bytes: &[u8]) {
        let _ = self.inner.write_shared(bytes);
        let _ = self.inner.flush_shared();
    }
}

impl Write for StreamTarget {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write_shared(buf)?;
        Ok(buf.len())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.inner.write_shared(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush_shared()
    }
}

impl fmt::Debug for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTarget")
            .field("ptr", &Arc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}

/// Identifies one successful redirect, used to restore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RedirectToken(u64);

/// Redirection state failures. Logged, never returned by public operations.
#[derive(Debug, Error)]
pub enum RedirectError {
    #[error("Stream redirection state lock poisoned")]
    Poisoned,
}

/// What a restore call found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The redirect was active and the originals are back in effect.
    Restored,
    /// A later redirect replaced this one; nothing was changed.
    Superseded,
    /// No redirect was active.
    NotRedirected,
    /// The state could not be updated; whatever was in effect remains.
    Failed,
}

struct Installed {
    token: RedirectToken,
    stdout: StreamTarget,
    stderr: StreamTarget,
}

/// Holder of the original standard streams and the current redirect.
pub struct StreamRedirector {
    original_stdout: StreamTarget,
    original_stderr: StreamTarget,
    installed: RwLock<Option<Installed>>,
    next_token: AtomicU64,
}

impl StreamRedirector {
    /// Create a redirector whose originals are the given targets.
    pub fn new(original_stdout: StreamTarget, original_stderr: StreamTarget) -> Self {
        Self {
            original_stdout,
            original_stderr,
            installed: RwLock::new(None),
            next_token: AtomicU64::new(1),
        }
    }

    /// Create a redirector over the real process streams.
    pub fn process() -> Self {
        Self::new(StreamTarget::stdout(), StreamTarget::stderr())
    }

    /// The pre-redirect target for `kind`.
    pub fn original(&self, kind: StreamKind) -> StreamTarget {
        match kind {
            StreamKind::Stdout => self.original_stdout.clone(),
            StreamKind::Stderr => self.original_stderr.clone(),
        }
    }

    /// The target writes for `kind` currently go to.
    pub fn current(&self, kind: StreamKind) -> StreamTarget {
        let installed = self.installed.read().unwrap_or_else(PoisonError::into_inner);
        match (installed.as_ref(), kind) {
            (Some(active), StreamKind::Stdout) => active.stdout.clone(),
            (Some(active), StreamKind::Stderr) => active.stderr.clone(),
            (None, kind) => self.original(kind),
        }
    }

    pub fn is_redirected(&self) -> bool {
        self.installed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Install `stdout`/`stderr` as the current destinations.
    ///
    /// Returns the token needed to restore, or `None` if installation failed
    /// (the failure is logged and the previous state stays in effect).
    pub fn redirect(&self, stdout: StreamTarget, stderr: StreamTarget) -> Option<RedirectToken> {
        let token = RedirectToken(self.next_token.fetch_add(1, Ordering::Relaxed));

        // Logging happens after the lock is released: the log writer may be
        // one of our own redirected streams.
        let swapped = self.swap(Some(Installed {
            token,
            stdout,
            stderr,
        }));

        match swapped {
            Ok(Some(previous)) => {
                warn!(
                    replaced = previous.token.0,
                    token = token.0,
                    "Standard streams were already redirected, replacing previous redirect"
                );
                Some(token)
            }
            Ok(None) => {
                debug!(token = token.0, "Standard streams redirected");
                Some(token)
            }
            Err(e) => {
                error!(error = %e, "Cannot redirect standard streams");
                None
            }
        }
    }

    /// Reinstate the originals if `token` is still the active redirect.
    pub fn restore(&self, token: RedirectToken) -> RestoreOutcome {
        // The removed targets are dropped only after the lock is released.
        let mut removed = None;
        let outcome = match self.installed.write() {
            Ok(mut installed) => match installed.as_ref().map(|active| active.token == token) {
                Some(true) => {
                    removed = installed.take();
                    RestoreOutcome::Restored
                }
                Some(false) => RestoreOutcome::Superseded,
                None => RestoreOutcome::NotRedirected,
            },
            Err(_) => RestoreOutcome::Failed,
        };
        drop(removed);

        match outcome {
            RestoreOutcome::Restored => debug!(token = token.0, "Standard streams restored"),
            RestoreOutcome::Superseded => debug!(
                token = token.0,
                "Redirect already replaced, leaving current streams in place"
            ),
            RestoreOutcome::NotRedirected => {}
            RestoreOutcome::Failed => error!(
                error = %RedirectError::Poisoned,
                token = token.0,
                "Cannot restore standard streams"
            ),
        }
        outcome
    }

    /// Reinstate the originals regardless of who redirected. No-op when
    /// nothing is redirected.
    pub fn reset(&self) {
        match self.swap(None) {
            Ok(Some(previous)) => debug!(token = previous.token.0, "Standard streams reset"),
            Ok(None) => {}
            Err(e) => error!(error = %e, "Cannot reset standard streams"),
        }
    }

    /// Handle writing to the current standard output.
    pub fn stdout(self: &Arc<Self>) -> RedirectedStream {
        RedirectedStream::new(Arc::clone(self), StreamKind::Stdout)
    }

    /// Handle writing to the current standard error.
    pub fn stderr(self: &Arc<Self>) -> RedirectedStream {
        RedirectedStream::new(Arc::clone(self), StreamKind::Stderr)
    }

    fn swap(&self, next: Option<Installed>) -> Result<Option<Installed>, RedirectError> {
        let mut installed = self.installed.write().map_err(|_| RedirectError::Poisoned)?;
        Ok(std::mem::replace(&mut *installed, next))
    }
}

impl fmt::Debug for StreamRedirector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRedirector")
            .field("redirected", &self.is_redirected())
            .finish_non_exhaustive()
    }
}

/// Writer that resolves the current target of a standard stream on every
/// write.
#[derive(Debug, Clone)]
pub struct RedirectedStream {
    redirector: Arc<StreamRedirector>,
    kind: StreamKind,
}

impl RedirectedStream {
    const fn new(redirector: Arc<StreamRedirector>, kind: StreamKind) -> Self {
        Self { redirector, kind }
    }

    pub const fn kind(&self) -> StreamKind {
        self.kind
    }
}

impl Write for RedirectedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.redirector.current(self.kind).write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.redirector.current(self.kind).write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.redirector.current(self.kind).flush()
    }
}

impl<'a> MakeWriter<'a> for RedirectedStream {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
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

    struct Fixture {
        redirector: Arc<StreamRedirector>,
        out: Captured,
        err: Captured,
    }

    fn fixture() -> Fixture {
        let out = Captured::default();
        let err = Captured::default();
        let redirector = Arc::new(StreamRedirector::new(
            StreamTarget::new(out.clone()),
            StreamTarget::new(err.clone()),
        ));
        Fixture {
            redirector,
            out,
            err,
        }
    }

    #[test]
    fn test_writes_go_to_originals_by_default() {
        let f = fixture();
        write!(f.redirector.stdout(), "to out").unwrap();
        write!(f.redirector.stderr(), "to err").unwrap();

        assert_eq!(f.out.text(), "to out");
        assert_eq!(f.err.text(), "to err");
        assert!(!f.redirector.is_redirected());
    }

    #[test]
    fn test_redirect_and_restore() {
        let f = fixture();
        let sink = Captured::default();
        let target = StreamTarget::new(sink.clone());

        let token = f
            .redirector
            .redirect(target.clone(), target.clone())
            .unwrap();
        write!(f.redirector.stdout(), "a").unwrap();
        write!(f.redirector.stderr(), "b").unwrap();
        assert_eq!(sink.text(), "ab");
        assert!(f.redirector.current(StreamKind::Stdout).ptr_eq(&target));

        assert_eq!(f.redirector.restore(token), RestoreOutcome::Restored);
        write!(f.redirector.stdout(), "c").unwrap();
        assert_eq!(f.out.text(), "c");
        assert_eq!(sink.text(), "ab");
    }

    #[test]
    fn test_restore_twice_is_noop() {
        let f = fixture();
        let target = StreamTarget::new(Captured::default());
        let token = f.redirector.redirect(target.clone(), target).unwrap();

        assert_eq!(f.redirector.restore(token), RestoreOutcome::Restored);
        assert_eq!(f.redirector.restore(token), RestoreOutcome::NotRedirected);
    }

    #[test]
    fn test_later_redirect_wins() {
        let f = fixture();
        let first = StreamTarget::new(Captured::default());
        let second_sink = Captured::default();
        let second = StreamTarget::new(second_sink.clone());

        let first_token = f.redirector.redirect(first.clone(), first).unwrap();
        let second_token = f.redirector.redirect(second.clone(), second).unwrap();

        // The older redirect cannot undo the newer one.
        assert_eq!(
            f.redirector.restore(first_token),
            RestoreOutcome::Superseded
        );
        write!(f.redirector.stdout(), "still second").unwrap();
        assert_eq!(second_sink.text(), "still second");

        assert_eq!(
            f.redirector.restore(second_token),
            RestoreOutcome::Restored
        );
        assert!(!f.redirector.is_redirected());
    }

    #[test]
    fn test_reset_without_redirect_is_noop() {
        let f = fixture();
        f.redirector.reset();
        assert!(!f.redirector.is_redirected());
    }

    #[test]
    fn test_original_is_unaffected_by_redirect() {
        let f = fixture();
        let target = StreamTarget::new(Captured::default());
        f.redirector.redirect(target.clone(), target).unwrap();

        f.redirector
            .original(StreamKind::Stderr)
            .write_best_effort(b"direct");
        assert_eq!(f.err.text(), "direct");
    }
}
