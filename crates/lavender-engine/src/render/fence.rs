use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::device::{GpuDevice, SharedEvent};

/// Longest single block between device polls while waiting.
const POLL_SLICE: Duration = Duration::from_millis(1);

/// Result of [`FrameFence::wait_if_necessary`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WaitOutcome {
    /// Fewer frames than slots have been submitted; nothing to wait for.
    NotRequired,
    /// The slot's previous occupant has retired.
    Signaled,
    /// The timeout elapsed first. The slot may still be in use.
    TimedOut,
}

/// Frame counter plus the event the GPU advances as frames retire.
#[derive(Debug)]
pub struct FrameFence {
    frame_number: u64,
    event: Arc<SharedEvent>,
    timeout: Duration,
}

impl FrameFence {
    pub fn new(timeout: Duration) -> Self {
        Self {
            frame_number: 0,
            event: Arc::new(SharedEvent::new(0)),
            timeout,
        }
    }

    /// Number of the most recently started frame. `0` before the first.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn signaled_value(&self) -> u64 {
        self.event.signaled_value()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn event(&self) -> &Arc<SharedEvent> {
        &self.event
    }

    /// Starts a new frame and returns its number.
    pub fn advance(&mut self) -> u64 {
        self.frame_number += 1;
        self.frame_number
    }

    /// Blocks until the frame that last used `frame_number`'s slot has retired.
    pub fn wait_if_necessary(
        &self,
        device: &dyn GpuDevice,
        frame_number: u64,
        frames_in_flight: u64,
    ) -> WaitOutcome {
        if frame_number < frames_in_flight {
            return WaitOutcome::NotRequired;
        }
        let target = frame_number - frames_in_flight;
        let deadline = Instant::now() + self.timeout;

        loop {
            device.poll();
            if self.event.signaled_value() >= target {
                return WaitOutcome::Signaled;
            }
            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "frame {}: fence wait for {} timed out after {:?} (signaled {})",
                    frame_number,
                    target,
                    self.timeout,
                    self.event.signaled_value()
                );
                return WaitOutcome::TimedOut;
            }
            if self.event.wait_until_signaled(target, POLL_SLICE.min(deadline - now)) {
                return WaitOutcome::Signaled;
            }
        }
    }

    /// Has the device set the fence to `frame_number` once work submitted so
    /// far retires.
    pub fn signal(&self, device: &dyn GpuDevice, frame_number: u64) {
        device.signal_event(&self.event, frame_number);
    }
}
