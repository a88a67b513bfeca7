//! Fleet registry
//!
//! [`FleetActor`] owns every device connection and the discovery scanner.
//! It runs as one task and applies messages from [`FleetHandle`]s,
//! transports, probes and timers in arrival order, so no state is shared.
//!
//! Observers get two channels:
//! - `devices_rx`: the full device list after every observable change
//! - `discovered_rx`: each address found by discovery

use std::sync::Arc;

use netprint_escpos::{DeviceAddress, Probe, TcpProbe, TcpTransportFactory, TransportFactory};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::connection::{DeviceConnection, DeviceKey, DeviceSnapshot};
use super::discovery::DiscoveryScanner;
use super::message::{FleetCommand, FleetMessage, Mailbox, Selection};
use crate::config::FleetConfig;
use crate::error::{FleetError, FleetResult};
use crate::receipt::ReceiptDocument;

/// Observer side of a running fleet
#[derive(Debug)]
pub struct FleetEvents {
    pub devices_rx: mpsc::UnboundedReceiver<Vec<DeviceSnapshot>>,
    pub discovered_rx: mpsc::UnboundedReceiver<DeviceAddress>,
}

/// Starts fleet actors
pub struct Fleet;

impl Fleet {
    /// Spawn a fleet actor on the current runtime
    pub fn spawn(
        config: FleetConfig,
        factory: Arc<dyn TransportFactory>,
        probe: Arc<dyn Probe>,
    ) -> (FleetHandle, FleetEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (devices_tx, devices_rx) = mpsc::unbounded_channel();
        let (discovered_tx, discovered_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let actor = FleetActor {
            scanner: DiscoveryScanner::new(
                probe,
                config.discovery_ports.clone(),
                config.discovery_timeout,
            ),
            config,
            devices: Vec::new(),
            next_generation: 0,
            factory,
            mailbox: Mailbox::new(&tx),
            devices_tx,
            discovered_tx,
        };
        tokio::spawn(actor.run(rx, shutdown.clone()));

        (
            FleetHandle { tx, shutdown },
            FleetEvents {
                devices_rx,
                discovered_rx,
            },
        )
    }

    /// Spawn a fleet that talks raw TCP
    pub fn spawn_tcp(config: FleetConfig) -> (FleetHandle, FleetEvents) {
        let factory = Arc::new(TcpTransportFactory::new(config.connect_timeout));
        Self::spawn(config, factory, Arc::new(TcpProbe))
    }
}

/// Cloneable command interface to a running fleet
///
/// Commands are fire-and-forget: they fail only when the fleet has stopped.
#[derive(Debug, Clone)]
pub struct FleetHandle {
    tx: mpsc::UnboundedSender<FleetMessage>,
    shutdown: CancellationToken,
}

impl FleetHandle {
    /// Track a device; no-op if the address is already known
    pub fn add(&self, address: DeviceAddress) -> FleetResult<()> {
        self.command(FleetCommand::Add(vec![address]))
    }

    pub fn add_all(&self, addresses: impl IntoIterator<Item = DeviceAddress>) -> FleetResult<()> {
        self.command(FleetCommand::Add(addresses.into_iter().collect()))
    }

    pub fn remove(&self, selection: Selection) -> FleetResult<()> {
        self.command(FleetCommand::Remove(selection))
    }

    pub fn connect(&self, selection: Selection) -> FleetResult<()> {
        self.command(FleetCommand::Connect(selection))
    }

    pub fn disconnect(&self, selection: Selection) -> FleetResult<()> {
        self.command(FleetCommand::Disconnect(selection))
    }

    /// Write raw bytes to connected devices, bypassing the job gate
    pub fn send(&self, selection: Selection, bytes: Vec<u8>) -> FleetResult<()> {
        self.command(FleetCommand::Send(selection, bytes))
    }

    /// Print a receipt on every selected device that is connected and idle
    pub fn print_check(
        &self,
        selection: Selection,
        document: ReceiptDocument,
    ) -> FleetResult<()> {
        self.command(FleetCommand::PrintCheck(selection, Box::new(document)))
    }

    /// Decode a JSON receipt and print it
    ///
    /// A payload that does not decode is rejected here and never reaches
    /// the devices.
    pub fn print_check_json(&self, selection: Selection, payload: &[u8]) -> FleetResult<()> {
        let document = ReceiptDocument::from_json(payload).inspect_err(|e| {
            tracing::warn!(error = %e, "Receipt rejected");
        })?;
        self.print_check(selection, document)
    }

    /// Probe the configured ports of `host`
    pub fn discover(&self, host: impl Into<String>) -> FleetResult<()> {
        self.command(FleetCommand::Discover(vec![host.into()]))
    }

    pub fn discover_hosts<I, S>(&self, hosts: I) -> FleetResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command(FleetCommand::Discover(
            hosts.into_iter().map(Into::into).collect(),
        ))
    }

    /// Current device list
    pub async fn devices(&self) -> FleetResult<Vec<DeviceSnapshot>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(FleetCommand::Devices(reply_tx))?;
        reply_rx.await.map_err(|_| FleetError::Closed)
    }

    /// Disconnect every device and stop the actor
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tx.closed().await;
    }

    fn command(&self, command: FleetCommand) -> FleetResult<()> {
        self.tx
            .send(FleetMessage::Command(command))
            .map_err(|_| FleetError::Closed)
    }
}

struct FleetActor {
    config: FleetConfig,
    devices: Vec<DeviceConnection>,
    next_generation: u64,
    scanner: DiscoveryScanner,
    factory: Arc<dyn TransportFactory>,
    mailbox: Mailbox,
    devices_tx: mpsc::UnboundedSender<Vec<DeviceSnapshot>>,
    discovered_tx: mpsc::UnboundedSender<DeviceAddress>,
}

impl FleetActor {
    /// Run until shutdown is requested or every handle is dropped
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<FleetMessage>,
        shutdown: CancellationToken,
    ) {
        info!("Fleet started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Fleet received shutdown signal");
                    break;
                }
                message = rx.recv() => {
                    let Some(message) = message else {
                        info!("All fleet handles dropped");
                        break;
                    };
                    self.handle(message);
                }
            }
        }

        for device in &mut self.devices {
            device.teardown();
        }
        info!(devices = self.devices.len(), "Fleet stopped");
    }

    fn handle(&mut self, message: FleetMessage) {
        match message {
            FleetMessage::Command(command) => self.handle_command(command),
            FleetMessage::Transport { device, event } => {
                let Some(i) = self.find(&device) else {
                    trace!(addr = %device.address, "Event for unknown device ignored");
                    return;
                };
                if self.devices[i].on_transport_event(event, &self.mailbox) {
                    self.publish();
                }
            }
            FleetMessage::ReconnectDue(device) => {
                let Some(i) = self.find(&device) else {
                    return;
                };
                if self.devices[i].on_reconnect_due(self.factory.as_ref(), &self.mailbox) {
                    self.publish();
                }
            }
            FleetMessage::ChunkDue { device, job, chunk } => {
                let Some(i) = self.find(&device) else {
                    trace!(addr = %device.address, job, "Chunk for removed device dropped");
                    return;
                };
                if self.devices[i].on_chunk_due(job, chunk) {
                    self.publish();
                }
            }
            FleetMessage::ProbeFinished { key, outcome } => {
                let Some(address) = self.scanner.complete(&key, outcome) else {
                    return;
                };
                if self.discovered_tx.send(address.clone()).is_err() {
                    trace!("Discovery observer dropped");
                }
                if self.config.auto_register {
                    self.add(vec![address]);
                }
            }
        }
    }

    fn handle_command(&mut self, command: FleetCommand) {
        match command {
            FleetCommand::Add(addresses) => self.add(addresses),
            FleetCommand::Remove(selection) => self.remove(selection),
            FleetCommand::Connect(selection) => {
                let mut changed = false;
                for i in self.select(&selection) {
                    changed |= self.devices[i].connect(self.factory.as_ref(), &self.mailbox);
                }
                if changed {
                    self.publish();
                }
            }
            FleetCommand::Disconnect(selection) => {
                for i in self.select(&selection) {
                    self.devices[i].disconnect();
                }
            }
            FleetCommand::Send(selection, bytes) => {
                for i in self.select(&selection) {
                    self.devices[i].send_raw(bytes.clone());
                }
            }
            FleetCommand::PrintCheck(selection, document) => {
                let mut accepted = false;
                for i in self.select(&selection) {
                    match self.devices[i].submit(&document, &self.mailbox) {
                        Ok(_) => accepted = true,
                        Err(reason) => info!(
                            addr = %self.devices[i].address(),
                            reason = %reason,
                            "Print job rejected"
                        ),
                    }
                }
                if accepted {
                    self.publish();
                }
            }
            FleetCommand::Discover(hosts) => {
                for host in &hosts {
                    self.scanner.probe_host(host, &self.mailbox);
                }
            }
            FleetCommand::Devices(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn add(&mut self, addresses: Vec<DeviceAddress>) {
        let mut changed = false;
        for address in addresses {
            if self.position(&address).is_some() {
                debug!(addr = %address, "Device already tracked");
                continue;
            }
            info!(addr = %address, "Device added");
            self.next_generation += 1;
            let key = DeviceKey {
                address,
                generation: self.next_generation,
            };
            self.devices.push(DeviceConnection::new(
                key,
                self.config.profile.clone(),
                self.config.reconnect_backoff,
            ));
            changed = true;
        }
        if changed {
            self.publish();
        }
    }

    fn remove(&mut self, selection: Selection) {
        let before = self.devices.len();
        self.devices.retain_mut(|device| {
            let selected = match &selection {
                Selection::All => true,
                Selection::One(address) => device.address() == address,
            };
            if selected {
                info!(addr = %device.address(), "Device removed");
                device.teardown();
            }
            !selected
        });
        if self.devices.len() != before {
            self.publish();
        }
    }

    fn position(&self, address: &DeviceAddress) -> Option<usize> {
        self.devices.iter().position(|d| d.address() == address)
    }

    /// Position of the device instance `key` was issued for
    fn find(&self, key: &DeviceKey) -> Option<usize> {
        self.position(&key.address)
            .filter(|&i| self.devices[i].key().generation == key.generation)
    }

    fn select(&self, selection: &Selection) -> Vec<usize> {
        match selection {
            Selection::All => (0..self.devices.len()).collect(),
            Selection::One(address) => {
                let found = self.position(address);
                if found.is_none() {
                    debug!(addr = %address, "Unknown device selected");
                }
                found.into_iter().collect()
            }
        }
    }

    fn snapshot(&self) -> Vec<DeviceSnapshot> {
        self.devices.iter().map(DeviceConnection::snapshot).collect()
    }

    fn publish(&self) {
        if self.devices_tx.send(self.snapshot()).is_err() {
            trace!("Device list observer dropped");
        }
    }
}
