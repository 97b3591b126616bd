//! Pulse source fed by `gpiomon` event lines.
//!
//! On a Linux board the GM tube output is wired to a GPIO line and watched by
//! libgpiod, e.g. `gpiomon --falling-edge gpiochip0 14 | geiger-sensor start`.
//! Each qualifying line increments the counter from this source's own thread.

use crate::core::counter::PulseCounter;
use crate::source::types::{EdgeEvent, EdgeFilter};
use crate::source::{PulseSource, SourceError};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Reads edge events from a file, FIFO or stdin.
pub struct GpiomonSource {
    filter: EdgeFilter,
    input: Option<PathBuf>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl GpiomonSource {
    /// Read from `input`, or stdin when `None`.
    pub fn new(filter: EdgeFilter, input: Option<PathBuf>) -> Self {
        Self {
            filter,
            input,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    fn open(&self) -> Result<Box<dyn BufRead + Send>, SourceError> {
        match &self.input {
            Some(path) => {
                let file = std::fs::File::open(path)
                    .map_err(|e| SourceError::Io(format!("{path:?}: {e}")))?;
                Ok(Box::new(BufReader::new(file)))
            }
            None => Ok(Box::new(BufReader::new(std::io::stdin()))),
        }
    }
}

/// Count qualifying lines until the reader ends or `running` drops.
pub fn pump_lines<R: BufRead>(
    reader: R,
    filter: EdgeFilter,
    counter: &PulseCounter,
    running: &AtomicBool,
) -> u64 {
    let mut qualified = 0;
    for line in reader.lines() {
        if !running.load(Ordering::Relaxed) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Pulse input read error: {e}");
                break;
            }
        };
        match EdgeEvent::parse_gpiomon(&line) {
            Some(event) if filter.qualifies(&event) => {
                counter.on_edge();
                qualified += 1;
            }
            _ => tracing::trace!(line = %line, "Ignoring input line"),
        }
    }
    qualified
}

impl PulseSource for GpiomonSource {
    fn start(&mut self, counter: Arc<PulseCounter>) -> Result<(), SourceError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SourceError::AlreadyRunning);
        }

        let reader = self.open()?;
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let filter = self.filter;
        let handle = thread::Builder::new()
            .name("pulse-gpiomon".to_string())
            .spawn(move || {
                let qualified = pump_lines(reader, filter, &counter, &running);
                tracing::warn!(qualified, "Pulse input closed, no further edges will be counted");
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| SourceError::Io(e.to_string()))?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            // A read blocked on stdin cannot be interrupted; leave it detached.
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn alive_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    fn describe(&self) -> String {
        let input = self
            .input
            .as_ref()
            .map(|p| format!("{p:?}"))
            .unwrap_or_else(|| "stdin".to_string());
        format!(
            "gpiomon ({input}, line {}, {} edge)",
            self.filter.pin, self.filter.edge
        )
    }
}

impl Drop for GpiomonSource {
    fn drop(&mut self) {
        self.stop();
    }
}
