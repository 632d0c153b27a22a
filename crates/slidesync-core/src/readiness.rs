//! Readiness monitor.
//!
//! The renderer is ready once it reports a positive slide count. Renderers
//! that expose no "metadata loaded" event are polled at a fixed interval;
//! those that do can call [`ReadinessMonitor::notify`] directly. Either way
//! the shared [`Ready`] future resolves exactly once.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_channel::oneshot;
use futures_util::future::{FutureExt, Shared};

#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};

/// Default polling interval in milliseconds.
pub const DEFAULT_READINESS_INTERVAL_MS: u64 = 500;

/// Snapshot delivered when the renderer becomes ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyInfo {
    pub slide_count: u32,
}

/// One-shot readiness signal. Clone freely; every clone observes the same
/// value.
///
/// Resolves to `None` if the session was destroyed before becoming ready.
#[derive(Clone)]
pub struct Ready {
    inner: Shared<oneshot::Receiver<ReadyInfo>>,
}

impl Future for Ready {
    type Output = Option<ReadyInfo>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx).map(Result::ok)
    }
}

/// Watches the renderer until it reports a positive slide count.
pub struct ReadinessMonitor {
    interval: Duration,
    last_check: Option<Instant>,
    sender: Option<oneshot::Sender<ReadyInfo>>,
    ready: Ready,
    info: Option<ReadyInfo>,
}

impl ReadinessMonitor {
    pub fn new(interval: Duration) -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            interval,
            last_check: None,
            sender: Some(sender),
            ready: Ready {
                inner: receiver.shared(),
            },
            info: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Future resolving once the renderer is ready.
    pub fn ready(&self) -> Ready {
        self.ready.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.info.is_some()
    }

    pub fn info(&self) -> Option<ReadyInfo> {
        self.info
    }

    /// Poll the renderer if the interval has elapsed since the last check.
    ///
    /// Returns the ready snapshot only on the call that resolved readiness.
    pub fn poll(&mut self, now: Instant, slide_count: impl FnOnce() -> u32) -> Option<ReadyInfo> {
        if self.is_ready() {
            return None;
        }
        if let Some(last) = self.last_check {
            if now.duration_since(last) < self.interval {
                return None;
            }
        }
        self.last_check = Some(now);
        self.notify(slide_count())
    }

    /// Report the renderer's slide count directly.
    pub fn notify(&mut self, slide_count: u32) -> Option<ReadyInfo> {
        if self.is_ready() || slide_count == 0 {
            return None;
        }
        let info = ReadyInfo { slide_count };
        self.info = Some(info);
        if let Some(sender) = self.sender.take() {
            // Nobody awaiting is fine; the shared receiver still holds the value.
            let _ = sender.send(info);
        }
        log::info!("Renderer ready with {} slides", slide_count);
        Some(info)
    }

    /// Abandon the signal; pending awaiters resolve to `None`.
    pub fn cancel(&mut self) {
        self.sender = None;
    }
}

impl Default for ReadinessMonitor {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_READINESS_INTERVAL_MS))
    }
}
