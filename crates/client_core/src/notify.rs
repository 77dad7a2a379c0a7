//! Notification sink handed to controllers, plus a bounded toast queue.

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_TOAST_TIMEOUT: Duration = Duration::from_millis(3200);
pub const MIN_TOAST_TIMEOUT: Duration = Duration::from_millis(1200);
pub const TOAST_QUEUE_LIMIT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tone {
    #[default]
    Default,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: Uuid,
    pub title: String,
    pub message: Option<String>,
    pub tone: Tone,
    pub timeout: Duration,
}

impl Toast {
    pub fn new(title: impl Into<String>, tone: Tone) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            message: None,
            tone,
            timeout: DEFAULT_TOAST_TIMEOUT,
        }
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(title, Tone::Success)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(title, Tone::Error).with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(MIN_TOAST_TIMEOUT);
        self
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, toast: Toast);
}

/// Writes toasts to the log and nothing else.
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, toast: Toast) {
        let message = toast.message.as_deref().unwrap_or_default();
        match toast.tone {
            Tone::Error => warn!(title = %toast.title, "toast: {message}"),
            Tone::Success | Tone::Default => info!(title = %toast.title, "toast: {message}"),
        }
    }
}

struct QueuedToast {
    toast: Toast,
    expires_at: Instant,
}

/// Newest-first queue holding at most [`TOAST_QUEUE_LIMIT`] toasts.
#[derive(Default)]
pub struct ToastQueue {
    inner: Mutex<Vec<QueuedToast>>,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Toast> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.iter().map(|queued| queued.toast.clone()).collect()
    }

    pub fn dismiss(&self, id: Uuid) -> bool {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|queued| queued.toast.id != id);
        guard.len() != before
    }

    /// Drops every toast whose timeout has elapsed at `now`; returns how many.
    pub fn expire(&self, now: Instant) -> usize {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|queued| queued.expires_at > now);
        before - guard.len()
    }

    pub fn drain(&self) -> Vec<Toast> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.drain(..).map(|queued| queued.toast).collect()
    }
}

impl NotificationSink for ToastQueue {
    fn notify(&self, toast: Toast) {
        let timeout = toast.timeout.max(MIN_TOAST_TIMEOUT);
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.insert(
            0,
            QueuedToast {
                expires_at: Instant::now() + timeout,
                toast,
            },
        );
        guard.truncate(TOAST_QUEUE_LIMIT);
    }
}
