use crate::config::Config;
use crate::note::{MidiEvent, Routing};
use crate::reducer::Reducer;
use crate::sampler::FrameSampler;
use crate::selector::HandSelector;
use crate::sink::MidiSink;
use crate::source::FrameSource;
use anyhow::Result;
use log::{debug, info, warn};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub events_sent: u64,
    pub send_failures: u64,
}

/// One run of the frame loop: classifier frames in, MIDI messages out.
pub struct Session {
    sampler: FrameSampler,
    selector: HandSelector,
    reducer: Reducer,
    routing: Routing,
    report: SessionReport,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        Self {
            sampler: FrameSampler::new(),
            selector: HandSelector::new(config.control_hand),
            reducer: Reducer::new(config),
            routing: config.midi.routing,
            report: SessionReport::default(),
        }
    }

    /// Runs until `stop` turns true or the source ends.
    ///
    /// Whatever ends the loop, a sounding note is switched off before
    /// returning. A source error is returned only after that.
    pub async fn run<S, K>(
        mut self,
        source: &mut S,
        sink: &mut K,
        mut stop: watch::Receiver<bool>,
    ) -> Result<SessionReport>
    where
        S: FrameSource + ?Sized,
        K: MidiSink + ?Sized,
    {
        info!(
            "Waiting for classifier (control hand: {})",
            self.selector.control_hand().as_str()
        );
        tokio::select! {
            biased;
            _ = stop_requested(&mut stop) => {
                info!("Stopped before classifier was ready");
                return Ok(self.report);
            }
            ready = source.wait_ready() => ready?,
        }
        info!("Classifier ready, processing frames");

        let outcome = loop {
            if *stop.borrow() {
                break Ok(());
            }
            let next = tokio::select! {
                biased;
                _ = stop_requested(&mut stop) => break Ok(()),
                next = source.next_frame() => next,
            };
            match next {
                Ok(Some(frame)) => {
                    let Some(frame) = self.sampler.accept(frame) else {
                        continue;
                    };
                    self.report.frames_processed += 1;
                    let selection = self.selector.select(&frame.hands);
                    let events = self.reducer.step(selection);
                    self.dispatch(sink, &events);
                }
                Ok(None) => {
                    info!("Classifier stream ended");
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };

        let events = self.reducer.flush();
        if !events.is_empty() {
            debug!("Silencing channel before exit");
        }
        self.dispatch(sink, &events);

        self.report.frames_skipped = self.sampler.skipped();
        info!(
            "Session finished: {} frames, {} duplicates skipped, {} events sent, {} send failures",
            self.report.frames_processed,
            self.report.frames_skipped,
            self.report.events_sent,
            self.report.send_failures
        );
        outcome.map(|()| self.report)
    }

    // Failed sends are not retried: the reducer already considers them emitted.
    fn dispatch<K: MidiSink + ?Sized>(&mut self, sink: &mut K, events: &[MidiEvent]) {
        for event in events {
            let message = event.encode(self.routing);
            match sink.send(event.destination(self.routing), message) {
                Ok(()) => self.report.events_sent += 1,
                Err(e) => {
                    self.report.send_failures += 1;
                    warn!("Dropped {:?}: {}", event, e);
                }
            }
        }
    }
}

async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    // A dropped sender can never ask for a stop.
    if stop.wait_for(|&stopped| stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}
