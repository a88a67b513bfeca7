//! Messages into the fleet actor and the mailbox that posts them
//!
//! Handles, transports, probes and timers never touch fleet state. They
//! post a [`FleetMessage`] and the actor applies it.

use std::time::Duration;

use netprint_escpos::{DeviceAddress, TransportEvent, TransportSink};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::trace;

use super::connection::{DeviceKey, DeviceSnapshot};
use super::discovery::{ProbeKey, ProbeOutcome};
use crate::receipt::{Chunk, ReceiptDocument};

/// Which devices a command applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    One(DeviceAddress),
}

impl From<DeviceAddress> for Selection {
    fn from(address: DeviceAddress) -> Self {
        Selection::One(address)
    }
}

#[derive(Debug)]
pub(crate) enum FleetCommand {
    Add(Vec<DeviceAddress>),
    Remove(Selection),
    Connect(Selection),
    Disconnect(Selection),
    Send(Selection, Vec<u8>),
    PrintCheck(Selection, Box<ReceiptDocument>),
    Discover(Vec<String>),
    Devices(oneshot::Sender<Vec<DeviceSnapshot>>),
}

#[derive(Debug)]
pub(crate) enum FleetMessage {
    Command(FleetCommand),
    Transport {
        device: DeviceKey,
        event: TransportEvent,
    },
    ReconnectDue(DeviceKey),
    ChunkDue {
        device: DeviceKey,
        job: u64,
        chunk: Chunk,
    },
    ProbeFinished {
        key: ProbeKey,
        outcome: ProbeOutcome,
    },
}

/// Posting side of the actor's channel
///
/// Holds a weak sender so that timers and transports do not keep the
/// actor alive once every handle is gone.
#[derive(Debug, Clone)]
pub(crate) struct Mailbox {
    tx: mpsc::WeakUnboundedSender<FleetMessage>,
}

impl Mailbox {
    pub(crate) fn new(tx: &mpsc::UnboundedSender<FleetMessage>) -> Self {
        Self { tx: tx.downgrade() }
    }

    pub(crate) fn post(&self, message: FleetMessage) {
        let delivered = self
            .tx
            .upgrade()
            .is_some_and(|tx| tx.send(message).is_ok());
        if !delivered {
            trace!("Fleet stopped, message dropped");
        }
    }

    /// Post `message` once `delay` has elapsed
    pub(crate) fn post_after(&self, delay: Duration, message: FleetMessage) {
        let mailbox = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            mailbox.post(message);
        });
    }

    /// Deliver a job's chunks in order, each at its offset from now
    pub(crate) fn pace(&self, device: DeviceKey, job: u64, chunks: Vec<Chunk>) {
        let mailbox = self.clone();
        let start = Instant::now();
        tokio::spawn(async move {
            for chunk in chunks {
                // A delay past the clock's range never comes due
                let Some(deadline) = start.checked_add(chunk.delay) else {
                    trace!(job, sequence = chunk.sequence, "Chunk delay out of range");
                    std::future::pending::<()>().await;
                    return;
                };
                tokio::time::sleep_until(deadline).await;
                mailbox.post(FleetMessage::ChunkDue {
                    device: device.clone(),
                    job,
                    chunk,
                });
            }
        });
    }

    /// Sink that tags transport events with the device they came from
    pub(crate) fn transport_sink(&self, device: DeviceKey) -> TransportSink {
        let mailbox = self.clone();
        TransportSink::new(move |event| {
            mailbox.post(FleetMessage::Transport {
                device: device.clone(),
                event,
            })
        })
    }
}
