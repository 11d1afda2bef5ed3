use anyhow::{Context, Result};
use image::DynamicImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::output::OutputManager;

/// What happened to a submitted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submit {
    Queued,
    /// The delivery slot was still occupied (or the worker is gone)
    Dropped,
}

/// Hands frames to a dedicated output thread without ever blocking.
pub struct FrameDispatcher {
    sender: Option<SyncSender<DynamicImage>>,
    frames_delivered: Arc<AtomicU64>,
    frames_dropped: Arc<AtomicU64>,
    worker_handle: Option<thread::JoinHandle<OutputManager>>,
}

impl FrameDispatcher {
    /// Start the output thread; it owns `manager` until shutdown
    pub fn new(manager: OutputManager) -> Result<Self> {
        // Capacity 1: at most one frame waits while another is being sent
        let (sender, receiver) = mpsc::sync_channel::<DynamicImage>(1);

        let frames_delivered = Arc::new(AtomicU64::new(0));
        let worker_delivered = Arc::clone(&frames_delivered);

        let worker_handle = thread::Builder::new()
            .name("output".into())
            .spawn(move || worker_thread(receiver, manager, worker_delivered))
            .context("Failed to spawn output thread")?;

        Ok(FrameDispatcher {
            sender: Some(sender),
            frames_delivered,
            frames_dropped: Arc::new(AtomicU64::new(0)),
            worker_handle: Some(worker_handle),
        })
    }

    /// Queue a frame (non-blocking, skip-ahead)
    pub fn submit(&self, frame: DynamicImage) -> Submit {
        let Some(sender) = self.sender.as_ref() else {
            return Submit::Dropped;
        };

        match sender.try_send(frame) {
            Ok(()) => Submit::Queued,
            Err(TrySendError::Full(_)) => {
                self.frames_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(target: "dispatch", "Output queue full, skipping frame");
                Submit::Dropped
            }
            Err(TrySendError::Disconnected(_)) => {
                self.frames_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(target: "dispatch", "Output thread is gone, dropping frame");
                Submit::Dropped
            }
        }
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    /// Close the queue, let the worker finish its current frame, then close
    /// every sink.
    pub fn shutdown(&mut self) {
        drop(self.sender.take());

        if let Some(handle) = self.worker_handle.take() {
            match handle.join() {
                Ok(manager) => manager.close(),
                Err(_) => error!(target: "dispatch", "Output thread panicked, sinks not closed"),
            }
        }
    }
}

impl Drop for FrameDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker thread function - blocks on the queue and delivers each frame
fn worker_thread(
    receiver: Receiver<DynamicImage>,
    manager: OutputManager,
    frames_delivered: Arc<AtomicU64>,
) -> OutputManager {
    for frame in receiver.iter() {
        let start = Instant::now();
        match manager.output(&frame) {
            Ok(()) => {
                frames_delivered.fetch_add(1, Ordering::Relaxed);
                debug!(target: "dispatch", "Output time: {:?}", start.elapsed());
            }
            Err(e) => warn!(target: "dispatch", "Output failed: {:#}", e),
        }
    }
    manager
}
