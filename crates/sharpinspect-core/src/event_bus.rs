use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

const DEFAULT_MAILBOX_CAPACITY: usize = 1024;

/// Real stderr fd to write panic-isolation messages to, bypassing whatever
/// currently has fd 2 redirected. `-1` means "not installed" (spec §4.3
/// Failure).
///
/// The fd-redirecting console hook lives in a higher-level crate and owns
/// the saved original fd; it calls [`set_panic_fallback_fd`] on install and
/// [`clear_panic_fallback_fd`] on uninstall so this crate, which can't
/// depend on the crate that owns the redirect, can still reach the real
/// stream.
#[cfg(unix)]
static PANIC_FALLBACK_FD: std::sync::atomic::AtomicI32 = std::sync::atomic::AtomicI32::new(-1);

#[cfg(unix)]
pub fn set_panic_fallback_fd(fd: std::os::fd::RawFd) {
    PANIC_FALLBACK_FD.store(fd, Ordering::SeqCst);
}

#[cfg(unix)]
pub fn clear_panic_fallback_fd() {
    PANIC_FALLBACK_FD.store(-1, Ordering::SeqCst);
}

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Disposable handle for one subscription. Dropping it detaches the handler
/// from the bus and stops its background dispatch task — disposal is the
/// only way to unsubscribe (spec §4.3, Glossary).
pub struct SubscriptionToken {
    dropped_events: Arc<AtomicU64>,
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl SubscriptionToken {
    /// Number of events dropped from this subscriber's mailbox due to
    /// overflow (spec §4.3 `publishAsync`).
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

impl Drop for SubscriptionToken {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

struct Mailbox<T> {
    queue: Mutex<VecDeque<T>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
}

impl<T> Mailbox<T> {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    /// Push `value`, dropping the oldest queued value on overflow. Returns
    /// true if an item was dropped.
    fn push(&self, value: T) -> bool {
        let mut dropped = false;
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                queue.pop_front();
                dropped = true;
            }
            queue.push_back(value);
        }
        self.notify.notify_one();
        dropped
    }

    async fn recv(&self) -> Option<T> {
        loop {
            if let Some(value) = self.queue.lock().pop_front() {
                return Some(value);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

struct Subscription<T> {
    id: u64,
    handler: Handler<T>,
    mailbox: Arc<Mailbox<T>>,
    dropped_events: Arc<AtomicU64>,
}

struct BroadcasterInner<T> {
    subs: Vec<Subscription<T>>,
    next_id: u64,
}

/// Single-type in-process pub/sub with per-subscriber bounded mailboxes.
///
/// [`EventBus`] wires up three of these — one per capture event kind —
/// rather than exposing a single `subscribe<T>` across arbitrary types: Rust
/// has no ergonomic open generic dispatch without `Any` downcasting, and
/// nothing in the corpus reaches for that machinery for a fixed, small set
/// of event kinds (see DESIGN.md OQ-1).
pub struct Broadcaster<T: Clone + Send + Sync + 'static> {
    inner: Arc<Mutex<BroadcasterInner<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> Broadcaster<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BroadcasterInner {
                subs: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Register `handler`. Returns a token that detaches it on drop.
    pub fn subscribe(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionToken {
        self.subscribe_with_mailbox_capacity(handler, DEFAULT_MAILBOX_CAPACITY)
    }

    pub fn subscribe_with_mailbox_capacity(
        &self,
        handler: impl Fn(&T) + Send + Sync + 'static,
        mailbox_capacity: usize,
    ) -> SubscriptionToken {
        let handler: Handler<T> = Arc::new(handler);
        let mailbox = Arc::new(Mailbox::new(mailbox_capacity));
        let dropped_events = Arc::new(AtomicU64::new(0));

        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subs.push(Subscription {
                id,
                handler: handler.clone(),
                mailbox: mailbox.clone(),
                dropped_events: dropped_events.clone(),
            });
            id
        };

        // Dedicated dispatch task: drains the mailbox in FIFO order and
        // invokes the same handler `publish` uses, so a subscriber sees one
        // consistent ordering regardless of which publish method fed it.
        let task_mailbox = mailbox.clone();
        let task_handler = handler;
        tokio::spawn(async move {
            while let Some(event) = task_mailbox.recv().await {
                invoke_isolated(&task_handler, &event);
            }
        });

        let inner = self.inner.clone();
        SubscriptionToken {
            dropped_events,
            detach: Some(Box::new(move || {
                mailbox.close();
                inner.lock().subs.retain(|s| s.id != id);
            })),
        }
    }

    /// Deliver `event` synchronously to every current subscriber, on the
    /// caller's thread. A handler that panics is isolated.
    pub fn publish(&self, event: T) {
        let subs: Vec<Handler<T>> = self.inner.lock().subs.iter().map(|s| s.handler.clone()).collect();
        for handler in subs {
            invoke_isolated(&handler, &event);
        }
    }

    /// Hand `event` to each subscriber's mailbox for async dispatch.
    /// Producers never block on a slow subscriber; on mailbox overflow the
    /// oldest queued event is dropped and the subscription's
    /// `dropped_events` counter is incremented.
    pub fn publish_async(&self, event: T) {
        let targets: Vec<(Arc<Mailbox<T>>, Arc<AtomicU64>)> = self
            .inner
            .lock()
            .subs
            .iter()
            .map(|s| (s.mailbox.clone(), s.dropped_events.clone()))
            .collect();
        for (mailbox, dropped_events) in targets {
            if mailbox.push(event.clone()) {
                dropped_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subs.len()
    }
}

fn invoke_isolated<T>(handler: &Handler<T>, event: &T) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| handler(event)));
    if let Err(payload) = result {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        report_panic(&message);
    }
}

/// Writes the panic message to the real stderr, bypassing ConsoleHook
/// (spec §4.3 Failure) so a panicking console subscriber can't feed its own
/// panic back into the pipeline it's subscribed to. `eprintln!` would just
/// write into whatever currently has fd 2 — which, once `ConsoleHook` is
/// installed, is the capture pipe, not the real stream.
#[cfg(unix)]
fn report_panic(message: &str) {
    let fd = PANIC_FALLBACK_FD.load(Ordering::SeqCst);
    if fd < 0 {
        eprintln!("sharpinspect: event bus subscriber panicked: {message}");
        return;
    }
    let line = format!("sharpinspect: event bus subscriber panicked: {message}\n");
    unsafe {
        libc::write(fd, line.as_ptr() as *const libc::c_void, line.len());
    }
}

#[cfg(not(unix))]
fn report_panic(message: &str) {
    eprintln!("sharpinspect: event bus subscriber panicked: {message}");
}

/// The three capture event channels the rest of the pipeline publishes to
/// and subscribes from (spec §2, §4.3).
#[derive(Default)]
pub struct EventBus {
    pub network: Broadcaster<crate::model::NetworkEntryEvent>,
    pub console: Broadcaster<crate::model::ConsoleEntryEvent>,
    pub performance: Broadcaster<crate::model::PerformanceEntryEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }
}
