//! Per-device connection state machine
//!
//! A [`DeviceConnection`] owns one lazily created transport and tracks:
//! - the connection state as confirmed by transport events
//! - whether the device should be reconnected after a drop
//! - the single in-flight print job

use std::time::Duration;

use netprint_escpos::{DeviceAddress, Transport, TransportEvent, TransportFactory};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::message::{FleetMessage, Mailbox};
use crate::receipt::{Chunk, PrinterProfile, ReceiptComposer, ReceiptDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Public view of one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub address: DeviceAddress,
    pub state: ConnectionState,
    pub pending_job: bool,
}

/// Why a print job was not accepted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobRejected {
    #[error("device is {0:?}")]
    NotConnected(ConnectionState),

    #[error("a print job is already in flight")]
    Busy,
}

/// One tracked instance of a device
///
/// A device removed and added again gets a new generation, so messages
/// still in flight for the old instance no longer match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct DeviceKey {
    pub address: DeviceAddress,
    pub generation: u64,
}

pub struct DeviceConnection {
    key: DeviceKey,
    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
    reconnect_desired: bool,
    reconnect_backoff: Duration,
    composer: ReceiptComposer,
    current_job: Option<u64>,
    next_job: u64,
    next_tag: u64,
}

impl DeviceConnection {
    pub(crate) fn new(
        key: DeviceKey,
        profile: PrinterProfile,
        reconnect_backoff: Duration,
    ) -> Self {
        Self {
            key,
            state: ConnectionState::Disconnected,
            transport: None,
            reconnect_desired: false,
            reconnect_backoff,
            composer: ReceiptComposer::new(profile),
            current_job: None,
            next_job: 0,
            next_tag: 0,
        }
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.key.address
    }

    pub(crate) fn key(&self) -> &DeviceKey {
        &self.key
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn has_pending_job(&self) -> bool {
        self.current_job.is_some()
    }

    pub fn reconnect_desired(&self) -> bool {
        self.reconnect_desired
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            address: self.key.address.clone(),
            state: self.state,
            pending_job: self.has_pending_job(),
        }
    }

    /// Start connecting; returns whether the state changed
    ///
    /// Only acts from `Disconnected` with a usable port.
    pub(crate) fn connect(&mut self, factory: &dyn TransportFactory, mailbox: &Mailbox) -> bool {
        if self.state != ConnectionState::Disconnected {
            debug!(addr = %self.key.address, state = ?self.state, "Connect ignored");
            return false;
        }
        if !self.key.address.has_valid_port() {
            debug!(addr = %self.key.address, "Connect ignored, invalid port");
            return false;
        }

        self.state = ConnectionState::Connecting;
        self.reconnect_desired = true;

        let key = &self.key;
        let transport = self.transport.get_or_insert_with(|| {
            factory.create(&key.address, mailbox.transport_sink(key.clone()))
        });
        if let Err(e) = transport.connect() {
            // The transport's disconnect event settles the state
            warn!(addr = %self.key.address, error = %e, "Connect could not be issued");
        }

        info!(addr = %self.key.address, "Connecting");
        true
    }

    /// Ask the transport to close and stop reconnecting
    pub(crate) fn disconnect(&mut self) {
        self.reconnect_desired = false;
        match self.transport.as_mut() {
            Some(transport) => {
                info!(addr = %self.key.address, "Disconnecting");
                transport.disconnect();
            }
            None => debug!(addr = %self.key.address, "Disconnect ignored, never connected"),
        }
    }

    /// Apply a transport event; returns whether the state changed
    pub(crate) fn on_transport_event(&mut self, event: TransportEvent, mailbox: &Mailbox) -> bool {
        match event {
            TransportEvent::Connected { host, port } => {
                if self.state == ConnectionState::Connected {
                    return false;
                }
                info!(addr = %self.key.address, host = %host, port, "Connected");
                self.state = ConnectionState::Connected;
                true
            }
            TransportEvent::Disconnected(reason) => {
                let changed = self.state != ConnectionState::Disconnected;
                self.state = ConnectionState::Disconnected;
                let addr = &self.key.address;
                match &reason {
                    Some(reason) => warn!(addr = %addr, reason = %reason, "Disconnected"),
                    None => info!(addr = %addr, "Disconnected"),
                }

                if self.reconnect_desired {
                    debug!(
                        addr = %self.key.address,
                        backoff_ms = self.reconnect_backoff.as_millis() as u64,
                        "Reconnect scheduled"
                    );
                    mailbox.post_after(
                        self.reconnect_backoff,
                        FleetMessage::ReconnectDue(self.key.clone()),
                    );
                }
                changed
            }
            TransportEvent::WriteCompleted(tag) => {
                trace!(addr = %self.key.address, tag, "Write acknowledged");
                false
            }
        }
    }

    /// Reconnect timer fired; the flag may have been cleared meanwhile
    pub(crate) fn on_reconnect_due(
        &mut self,
        factory: &dyn TransportFactory,
        mailbox: &Mailbox,
    ) -> bool {
        if !self.reconnect_desired {
            debug!(addr = %self.key.address, "Reconnect cancelled");
            return false;
        }
        self.connect(factory, mailbox)
    }

    /// Accept a print job and start pacing its chunks
    pub(crate) fn submit(
        &mut self,
        document: &ReceiptDocument,
        mailbox: &Mailbox,
    ) -> Result<u64, JobRejected> {
        if self.state != ConnectionState::Connected {
            return Err(JobRejected::NotConnected(self.state));
        }
        if self.current_job.is_some() {
            return Err(JobRejected::Busy);
        }

        let chunks = self.composer.compose(document);
        self.next_job += 1;
        let job = self.next_job;
        self.current_job = Some(job);

        info!(addr = %self.key.address, job, chunks = chunks.len(), "Print job accepted");
        mailbox.pace(self.key.clone(), job, chunks);
        Ok(job)
    }

    /// Hand a due chunk to the transport; returns whether the job finished
    pub(crate) fn on_chunk_due(&mut self, job: u64, chunk: Chunk) -> bool {
        if self.current_job != Some(job) {
            debug!(addr = %self.key.address, job, "Chunk for finished job dropped");
            return false;
        }

        if self.state == ConnectionState::Connected {
            self.write(chunk.bytes);
        } else {
            warn!(
                addr = %self.key.address,
                job,
                sequence = chunk.sequence,
                state = ?self.state,
                "Chunk dropped, device not connected"
            );
        }

        if chunk.is_final {
            self.current_job = None;
            info!(addr = %self.key.address, job, "Print job finished");
            return true;
        }
        false
    }

    /// Write bytes outside the job gate
    pub(crate) fn send_raw(&mut self, bytes: Vec<u8>) -> bool {
        if self.state != ConnectionState::Connected {
            debug!(addr = %self.key.address, state = ?self.state, "Raw send dropped");
            return false;
        }
        self.write(bytes);
        true
    }

    /// Close the transport for good (removal or shutdown)
    pub(crate) fn teardown(&mut self) {
        self.reconnect_desired = false;
        if let Some(mut transport) = self.transport.take() {
            transport.disconnect();
        }
    }

    fn write(&mut self, bytes: Vec<u8>) {
        let Some(transport) = self.transport.as_mut() else {
            warn!(addr = %self.key.address, "Write dropped, no transport");
            return;
        };
        self.next_tag += 1;
        trace!(addr = %self.key.address, tag = self.next_tag, len = bytes.len(), "Write");
        transport.write(bytes, self.next_tag);
    }
}

impl std::fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConnection")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("reconnect_desired", &self.reconnect_desired)
            .field("current_job", &self.current_job)
            .finish()
    }
}
