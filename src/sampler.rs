use crate::frame::RecognitionFrame;
use log::warn;

/// Drops frames whose timestamp was already processed.
#[derive(Debug, Default)]
pub struct FrameSampler {
    last_timestamp: Option<u64>,
    skipped: u64,
}

impl FrameSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, frame: RecognitionFrame) -> Option<RecognitionFrame> {
        match self.last_timestamp {
            Some(last) if last == frame.timestamp_ms => {
                self.skipped += 1;
                return None;
            }
            Some(last) if frame.timestamp_ms < last => {
                warn!(
                    "Frame timestamp went backwards ({} -> {}), classifier restarted?",
                    last, frame.timestamp_ms
                );
            }
            _ => {}
        }
        self.last_timestamp = Some(frame.timestamp_ms);
        Some(frame)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
