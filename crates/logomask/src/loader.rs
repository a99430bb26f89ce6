use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::{normalize, PixelBuffer, RawImage};

/// Generation stamp handed out for each load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadTicket(u64);

impl LoadTicket {
    pub fn generation(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
pub enum LoadEvent {
    Ready {
        ticket: LoadTicket,
        label: String,
        buffer: PixelBuffer,
    },
    Failed {
        ticket: LoadTicket,
        label: String,
        error: anyhow::Error,
    },
}

impl LoadEvent {
    pub fn ticket(&self) -> LoadTicket {
        match self {
            LoadEvent::Ready { ticket, .. } | LoadEvent::Failed { ticket, .. } => *ticket,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            LoadEvent::Ready { label, .. } | LoadEvent::Failed { label, .. } => label,
        }
    }
}

struct Completion {
    ticket: LoadTicket,
    label: String,
    result: Result<PixelBuffer>,
}

/// Fetches and normalises logos off the render thread.
///
/// Only the most recent request can complete: a result that arrives after a
/// newer request was issued is dropped in [`ImageLoader::poll`].
pub struct ImageLoader {
    generation: u64,
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageLoader {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            generation: 0,
            sender,
            receiver,
        }
    }

    /// Starts a load. `fetch` produces the encoded bytes on a worker thread,
    /// which then normalises them.
    pub fn request<F>(&mut self, label: impl Into<String>, fetch: F) -> Result<LoadTicket>
    where
        F: FnOnce() -> Result<RawImage> + Send + 'static,
    {
        self.generation += 1;
        let ticket = LoadTicket(self.generation);
        let label = label.into();
        let sender = self.sender.clone();
        let worker_label = label.clone();

        thread::Builder::new()
            .name("logo-loader".into())
            .spawn(move || {
                let result = fetch().and_then(|raw| {
                    normalize(&raw).with_context(|| format!("normalize {worker_label}"))
                });
                let _ = sender.send(Completion {
                    ticket,
                    label: worker_label,
                    result,
                });
            })
            .map_err(|err| anyhow!("failed to spawn loader thread: {err}"))?;

        debug!(generation = ticket.0, %label, "logo load requested");
        Ok(ticket)
    }

    pub fn latest(&self) -> Option<LoadTicket> {
        (self.generation > 0).then_some(LoadTicket(self.generation))
    }

    pub fn is_current(&self, ticket: LoadTicket) -> bool {
        ticket.0 == self.generation
    }

    /// Drains finished work without blocking and returns the newest request's
    /// outcome if it has arrived.
    pub fn poll(&mut self) -> Option<LoadEvent> {
        let mut current = None;
        while let Ok(done) = self.receiver.try_recv() {
            if let Some(event) = self.accept(done) {
                current = Some(event);
            }
        }
        current
    }

    /// Blocks until the newest request completes or `timeout` elapses.
    pub fn wait(&mut self, timeout: Duration) -> Option<LoadEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(done) => {
                    if let Some(event) = self.accept(done) {
                        return Some(event);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None
                }
            }
        }
    }

    fn accept(&self, done: Completion) -> Option<LoadEvent> {
        if !self.is_current(done.ticket) {
            debug!(
                generation = done.ticket.0,
                latest = self.generation,
                label = %done.label,
                "discarding superseded logo load"
            );
            return None;
        }
        match done.result {
            Ok(buffer) => Some(LoadEvent::Ready {
                ticket: done.ticket,
                label: done.label,
                buffer,
            }),
            Err(error) => {
                warn!(label = %done.label, "logo load failed: {error:#}");
                Some(LoadEvent::Failed {
                    ticket: done.ticket,
                    label: done.label,
                    error,
                })
            }
        }
    }
}
