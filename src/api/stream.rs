// src/api/stream.rs — Cancellable single-producer event stream
//
// The handler pushes events through an `EventChannel`; the consumer reads them
// back from an `EventStream` and frames them for its transport (SSE for the
// HTTP API, JSON lines for the CLI). Dropping the stream before
// the handler finishes is treated as a disconnect: the signal fires and every
// registered cleanup runs once.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::{FutureExt, Stream};
use pin_project::{pin_project, pinned_drop};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::types::StreamingEvent;

/// Terminal error item of a stream whose handler failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("event stream handler failed: {0}")]
pub struct StreamError(String);

type Frame = Result<StreamingEvent, StreamError>;
type Cleanup = Box<dyn FnOnce() + Send>;

struct ChannelInner {
    tx: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    signal: CancellationToken,
    cleanups: Mutex<Vec<Cleanup>>,
    finished: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Producer side handed to the stream handler.
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<ChannelInner>,
}

impl EventChannel {
    /// Push one event. Dropped silently once the channel is closed or cancelled.
    /// Returns whether the event was written.
    pub fn emit(&self, event: &StreamingEvent) -> bool {
        if self.inner.signal.is_cancelled() {
            return false;
        }
        let tx = lock(&self.inner.tx);
        match tx.as_ref() {
            Some(tx) => tx.send(Ok(event.clone())).is_ok(),
            None => false,
        }
    }

    pub fn signal(&self) -> &CancellationToken {
        &self.inner.signal
    }

    /// Register a callback to run once when the stream ends or the consumer goes away.
    pub fn on_cleanup(&self, callback: impl FnOnce() + Send + 'static) {
        lock(&self.inner.cleanups).push(Box::new(callback));
    }

    /// End the stream normally. Idempotent.
    pub fn close(&self) {
        lock(&self.inner.tx).take();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner.tx).is_none()
    }

    fn fail(&self, message: String) {
        if let Some(tx) = lock(&self.inner.tx).take() {
            let _ = tx.send(Err(StreamError(message)));
        }
    }

    fn run_cleanups(&self) {
        let callbacks = std::mem::take(&mut *lock(&self.inner.cleanups));
        for (i, callback) in callbacks.into_iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                error!(index = i, "Stream cleanup callback panicked");
            }
        }
    }
}

/// Consumer side: events in emission order, ending with a `StreamError` if the handler failed.
#[pin_project(PinnedDrop)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Frame>,
    channel: EventChannel,
}

impl EventStream {
    pub fn signal(&self) -> &CancellationToken {
        self.channel.signal()
    }
}

impl Stream for EventStream {
    type Item = Frame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().rx.poll_recv(cx)
    }
}

#[pinned_drop]
impl PinnedDrop for EventStream {
    fn drop(self: Pin<&mut Self>) {
        let channel = self.project().channel;
        if channel.inner.finished.load(Ordering::SeqCst) {
            return;
        }
        debug!("Event stream consumer disconnected");
        channel.inner.signal.cancel();
        channel.close();
        channel.run_cleanups();
    }
}

/// Start `handler` on its own task and return the consumer side of its channel.
///
/// The signal is a child of `parent` when given. A handler error while the
/// signal has not fired ends the stream with a `StreamError` item.
pub fn create_event_stream<F, Fut>(parent: Option<&CancellationToken>, handler: F) -> EventStream
where
    F: FnOnce(EventChannel) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let signal = parent
        .map(CancellationToken::child_token)
        .unwrap_or_default();
    let (tx, rx) = mpsc::unbounded_channel();

    let channel = EventChannel {
        inner: Arc::new(ChannelInner {
            tx: Mutex::new(Some(tx)),
            signal,
            cleanups: Mutex::new(Vec::new()),
            finished: AtomicBool::new(false),
        }),
    };

    let fut = handler(channel.clone());
    let task_channel = channel.clone();
    tokio::spawn(async move {
        let result = match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("event stream handler panicked")),
        };
        task_channel.inner.finished.store(true, Ordering::SeqCst);
        // cleanups finish before the consumer sees the end of the stream
        task_channel.run_cleanups();

        match result {
            Ok(()) => task_channel.close(),
            Err(e) if !task_channel.signal().is_cancelled() => {
                warn!("Event stream handler failed: {e:#}");
                task_channel.fail(e.to_string());
            }
            Err(e) => {
                debug!("Event stream handler stopped after cancellation: {e:#}");
                task_channel.close();
            }
        }
    });

    EventStream { rx, channel }
}
