//! Fixed-rate pulse generator for bench runs without a tube attached.

use crate::core::counter::PulseCounter;
use crate::source::{PulseSource, SourceError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Emits `cpm` evenly spaced pulses per minute.
pub struct SimulatedSource {
    cpm: u32,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl SimulatedSource {
    pub fn new(cpm: u32) -> Self {
        Self {
            cpm,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Gap between pulses, or `None` when the rate is zero.
    pub fn interval(&self) -> Option<Duration> {
        (self.cpm > 0).then(|| Duration::from_micros(60_000_000 / self.cpm as u64))
    }
}

impl PulseSource for SimulatedSource {
    fn start(&mut self, counter: Arc<PulseCounter>) -> Result<(), SourceError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SourceError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let interval = self.interval();
        let handle = thread::Builder::new()
            .name("pulse-simulated".to_string())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    match interval {
                        Some(gap) => {
                            thread::sleep(gap);
                            counter.on_edge();
                        }
                        None => thread::sleep(Duration::from_millis(100)),
                    }
                }
            })
            .map_err(|e| SourceError::Io(e.to_string()))?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn alive_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    fn describe(&self) -> String {
        format!("simulated ({} cpm)", self.cpm)
    }
}

impl Drop for SimulatedSource {
    fn drop(&mut self) {
        self.stop();
    }
}
