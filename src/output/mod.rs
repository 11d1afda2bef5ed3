use anyhow::Result;
use image::DynamicImage;
use tracing::{debug, warn};

mod ax206;
mod file;

pub use ax206::Ax206Output;
pub use file::FileOutput;

/// A destination for rendered frames
pub trait OutputHandler: Send {
    /// Deliver one frame
    fn output(&self, frame: &DynamicImage) -> Result<()>;

    /// Release whatever the sink holds; calling it twice is harmless
    fn close(&self) -> Result<()>;

    /// Short tag used in log lines
    fn kind(&self) -> &'static str;
}

/// Broadcasts each frame to every registered sink, in order.
#[derive(Default)]
pub struct OutputManager {
    handlers: Vec<Box<dyn OutputHandler>>,
}

impl OutputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&mut self, handler: Box<dyn OutputHandler>) {
        self.handlers.push(handler);
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Send `frame` to all sinks.
    ///
    /// Succeeds if at least one sink took the frame. When every sink fails,
    /// the error from the last one is returned.
    pub fn output(&self, frame: &DynamicImage) -> Result<()> {
        let mut last_err = None;
        let mut delivered = false;

        for handler in &self.handlers {
            match handler.output(frame) {
                Ok(()) => delivered = true,
                Err(e) => {
                    warn!(target: "output", "{} failed: {:#}", handler.kind(), e);
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if !delivered => Err(e),
            _ => Ok(()),
        }
    }

    /// Close every sink, ignoring individual failures
    pub fn close(&self) {
        for handler in &self.handlers {
            if let Err(e) = handler.close() {
                debug!(target: "output", "{} close failed: {:#}", handler.kind(), e);
            }
        }
    }
}
