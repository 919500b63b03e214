//! Scripted telemetry link driven from the test through a channel.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use jobmirror_core::retry::ErrorKind;
use jobmirror_core::telemetry::{LinkCloser, LinkError, LinkEvent, TelemetryLink};

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkScript {
    /// `open` never resolves.
    pub hang_open: bool,
    /// `open` resolves but the link reports disconnected afterwards.
    pub never_settles: bool,
    pub refuse_open: bool,
    pub refuse_subscribe: bool,
    /// `next_event` never notices a close request.
    pub ignore_close: bool,
}

/// Test-side view of a `FakeLink`.
#[derive(Debug, Clone)]
pub struct LinkControl {
    tx: mpsc::UnboundedSender<LinkEvent>,
    connected: Arc<AtomicBool>,
    pub subscriptions: Arc<Mutex<Vec<String>>>,
    pub published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    pub closes: Arc<AtomicUsize>,
    /// Close requests the receive loop actually processed.
    pub flushed_closes: Arc<AtomicUsize>,
}

impl LinkControl {
    pub fn send(&self, event: LinkEvent) {
        let _ = self.tx.send(event);
    }

    pub fn report(&self, topic: &str, payload: &str) {
        self.send(LinkEvent::Message {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
        });
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn flushed_close_count(&self) -> usize {
        self.flushed_closes.load(Ordering::SeqCst)
    }
}

pub struct FakeLink {
    script: LinkScript,
    rx: mpsc::UnboundedReceiver<LinkEvent>,
    connected: Arc<AtomicBool>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    closes: Arc<AtomicUsize>,
    close_requested: Arc<Notify>,
    flushed_closes: Arc<AtomicUsize>,
}

impl FakeLink {
    pub fn new(script: LinkScript) -> (Self, LinkControl) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        let published = Arc::new(Mutex::new(Vec::new()));
        let closes = Arc::new(AtomicUsize::new(0));
        let flushed_closes = Arc::new(AtomicUsize::new(0));
        let control = LinkControl {
            tx,
            connected: Arc::clone(&connected),
            subscriptions: Arc::clone(&subscriptions),
            published: Arc::clone(&published),
            closes: Arc::clone(&closes),
            flushed_closes: Arc::clone(&flushed_closes),
        };
        let link = Self {
            script,
            rx,
            connected,
            subscriptions,
            published,
            closes,
            close_requested: Arc::new(Notify::new()),
            flushed_closes,
        };
        (link, control)
    }
}

#[async_trait]
impl TelemetryLink for FakeLink {
    async fn open(&mut self) -> Result<(), LinkError> {
        if self.script.hang_open {
            std::future::pending::<()>().await;
        }
        if self.script.refuse_open {
            return Err(LinkError::new(ErrorKind::Rejected, "bad user name or password"));
        }
        self.connected.store(!self.script.never_settles, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), LinkError> {
        if self.script.refuse_subscribe {
            return Err(LinkError::new(ErrorKind::Connection, "subscribe refused"));
        }
        self.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), LinkError> {
        self.published.lock().unwrap().push((topic.to_string(), payload));
        Ok(())
    }

    async fn next_event(&mut self) -> LinkEvent {
        let received = tokio::select! {
            biased;
            _ = self.close_requested.notified(), if !self.script.ignore_close => None,
            event = self.rx.recv() => Some(event),
        };
        let Some(received) = received else {
            self.flushed_closes.fetch_add(1, Ordering::SeqCst);
            return LinkEvent::Finished;
        };
        let Some(event) = received else {
            return LinkEvent::Finished;
        };
        match &event {
            LinkEvent::Connected => self.connected.store(true, Ordering::SeqCst),
            LinkEvent::Closed(_) | LinkEvent::Errored { .. } => self.connected.store(false, Ordering::SeqCst),
            _ => {}
        }
        event
    }

    fn closer(&self) -> LinkCloser {
        let connected = Arc::clone(&self.connected);
        let closes = Arc::clone(&self.closes);
        let close_requested = Arc::clone(&self.close_requested);
        Box::new(move || {
            if connected.swap(false, Ordering::SeqCst) {
                closes.fetch_add(1, Ordering::SeqCst);
            }
            close_requested.notify_one();
            Ok(())
        })
    }
}
