use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::batcher::{PacketBatcher, PushOutcome};
use crate::device::DeviceEvent;
use crate::settings::BatcherSettings;
use crate::wire::{LogLevel, WireMessage};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub chunks: u64,
    pub flushes: u64,
    pub overflows: u64,
}

/// Host side of the mirror: batches device video on a timer and forwards
/// it, together with connection events, as JSON wire messages.
///
/// Pending video is always flushed before a connection event so the UI
/// sees messages in device order.
pub struct HostRelay {
    batcher: PacketBatcher,
    settings: BatcherSettings,
    stats: RelayStats,
}

impl HostRelay {
    pub fn new(settings: BatcherSettings) -> Self {
        Self {
            batcher: PacketBatcher::with_capacity(settings.max_buffer_bytes),
            settings,
            stats: RelayStats::default(),
        }
    }

    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<DeviceEvent>,
        wire: mpsc::Sender<String>,
        shutdown: CancellationToken,
    ) -> RelayStats {
        let mut ticker = tokio::time::interval(self.settings.flush_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // The ticker goes before events so a busy device cannot starve it.
            let keep_going = tokio::select! {
                biased;
                _ = shutdown.cancelled() => false,
                _ = ticker.tick() => self.flush(&wire).await,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event, &wire).await,
                    None => false,
                },
            };
            if !keep_going {
                break;
            }
        }

        self.flush(&wire).await;
        self.stats.flushes = self.batcher.flushes();
        self.stats.overflows = self.batcher.overflows();
        tracing::info!(
            chunks = self.stats.chunks,
            flushes = self.stats.flushes,
            overflows = self.stats.overflows,
            "host relay stopped"
        );
        self.stats
    }

    async fn handle_event(&mut self, event: DeviceEvent, wire: &mpsc::Sender<String>) -> bool {
        match event {
            DeviceEvent::Video(chunk) => {
                self.stats.chunks += 1;
                // Flush early while the UI has room; the cap only bites when
                // the wire is backed up.
                let backed_up = wire.capacity() == 0;
                if !self.batcher.fits(chunk.len()) && !backed_up && !self.flush(wire).await {
                    return false;
                }
                if let PushOutcome::Overflowed { discarded } = self.batcher.push(&chunk) {
                    let msg = WireMessage::log(
                        LogLevel::Warn,
                        format!("video backlog of {discarded} bytes discarded"),
                    );
                    return send(wire, &msg).await;
                }
                true
            }
            DeviceEvent::Connected { device, meta } => {
                let msg = WireMessage::Connected {
                    device,
                    width: meta.as_ref().map(|m| m.width),
                    height: meta.as_ref().map(|m| m.height),
                };
                self.flush(wire).await && send(wire, &msg).await
            }
            DeviceEvent::Disconnected { reason } => {
                let msg = WireMessage::Disconnected { reason };
                self.flush(wire).await && send(wire, &msg).await
            }
        }
    }

    async fn flush(&mut self, wire: &mpsc::Sender<String>) -> bool {
        match self.batcher.flush() {
            Some(batch) => send(wire, &WireMessage::video(&batch)).await,
            None => true,
        }
    }
}

/// Returns false once the UI side is gone.
async fn send(wire: &mpsc::Sender<String>, msg: &WireMessage) -> bool {
    let json = match msg.to_json() {
        Ok(json) => json,
        Err(err) => {
            tracing::error!("failed to encode wire message: {err}");
            return true;
        }
    };
    wire.send(json).await.is_ok()
}
