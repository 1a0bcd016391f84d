//! [`MailTransport`] that records instead of delivering, for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use lettre::Message;

use crate::error::NotifyError;
use crate::transport::{MailSession, MailTransport};

#[derive(Debug, Default)]
struct Recorder {
    opens: AtomicUsize,
    closes: AtomicUsize,
    refuse: AtomicBool,
    sent: Mutex<Vec<Message>>,
}

/// Cloning shares the recording.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    inner: Arc<Recorder>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `open` fail as if the server were down.
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Message> {
        self.inner
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Envelope recipients of every delivered message, in delivery order.
    pub fn recipients(&self) -> Vec<String> {
        self.sent()
            .iter()
            .flat_map(|m| m.envelope().to().iter().map(|a| a.to_string()).collect::<Vec<_>>())
            .collect()
    }
}

impl MailTransport for RecordingTransport {
    fn open(&self) -> Result<Box<dyn MailSession>, NotifyError> {
        if self.inner.refuse.load(Ordering::SeqCst) {
            return Err(NotifyError::Unreachable {
                host: "recording".to_string(),
                port: 25,
            });
        }
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingSession {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct RecordingSession {
    inner: Arc<Recorder>,
}

impl MailSession for RecordingSession {
    fn send(&mut self, message: &Message) -> Result<(), NotifyError> {
        self.inner
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), NotifyError> {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
