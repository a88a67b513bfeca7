//! In-memory transport and probe for exercising the fleet without sockets

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use netprint_escpos::{
    DeviceAddress, PrintError, PrintResult, Probe, Transport, TransportEvent, TransportFactory,
    TransportSink,
};

/// One call made on a [`RecordingFactory`] transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect,
    Write(Vec<u8>),
    Disconnect,
}

#[derive(Default)]
struct Recorder {
    created: usize,
    auto: bool,
    fail_connects: bool,
    calls: HashMap<DeviceAddress, Vec<TransportCall>>,
    sinks: HashMap<DeviceAddress, TransportSink>,
}

/// Transport factory that records every call
///
/// In auto mode `connect` immediately reports `Connected` and `disconnect`
/// reports `Disconnected(None)`. Otherwise tests drive events with
/// [`RecordingFactory::emit`].
#[derive(Clone, Default)]
pub struct RecordingFactory {
    recorder: Arc<Mutex<Recorder>>,
}

impl RecordingFactory {
    /// Factory whose transports confirm connects and disconnects at once
    pub fn auto() -> Self {
        let factory = Self::default();
        factory.lock().auto = true;
        factory
    }

    fn lock(&self) -> MutexGuard<'_, Recorder> {
        self.recorder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `Transport::connect` fail synchronously, reporting a disconnect
    pub fn fail_connects(&self, fail: bool) {
        self.lock().fail_connects = fail;
    }

    /// Number of transports created so far
    pub fn created(&self) -> usize {
        self.lock().created
    }

    pub fn calls(&self, address: &DeviceAddress) -> Vec<TransportCall> {
        self.lock().calls.get(address).cloned().unwrap_or_default()
    }

    /// All bytes written to `address`, in order
    pub fn written(&self, address: &DeviceAddress) -> Vec<u8> {
        self.calls(address)
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Write(bytes) => Some(bytes),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Deliver a transport event for `address`; `false` if it has no transport
    pub fn emit(&self, address: &DeviceAddress, event: TransportEvent) -> bool {
        let sink = self.lock().sinks.get(address).cloned();
        match sink {
            Some(sink) => {
                sink.emit(event);
                true
            }
            None => false,
        }
    }

    /// Simulate the printer dropping the connection
    pub fn drop_connection(&self, address: &DeviceAddress, reason: &str) -> bool {
        self.emit(address, TransportEvent::Disconnected(Some(reason.to_string())))
    }
}

impl TransportFactory for RecordingFactory {
    fn create(&self, address: &DeviceAddress, sink: TransportSink) -> Box<dyn Transport> {
        let mut recorder = self.lock();
        recorder.created += 1;
        recorder.sinks.insert(address.clone(), sink.clone());
        Box::new(RecordingTransport {
            address: address.clone(),
            sink,
            recorder: self.recorder.clone(),
        })
    }
}

struct RecordingTransport {
    address: DeviceAddress,
    sink: TransportSink,
    recorder: Arc<Mutex<Recorder>>,
}

impl RecordingTransport {
    /// Record the call and return (auto, fail_connects)
    fn record(&self, call: TransportCall) -> (bool, bool) {
        let mut recorder = self.recorder.lock().unwrap_or_else(PoisonError::into_inner);
        recorder
            .calls
            .entry(self.address.clone())
            .or_default()
            .push(call);
        (recorder.auto, recorder.fail_connects)
    }
}

impl Transport for RecordingTransport {
    fn connect(&mut self) -> PrintResult<()> {
        let (auto, fail) = self.record(TransportCall::Connect);
        if fail {
            let error = PrintError::Connection(format!("{}: refused", self.address));
            self.sink
                .emit(TransportEvent::Disconnected(Some(error.to_string())));
            return Err(error);
        }
        if auto {
            self.sink.emit(TransportEvent::Connected {
                host: self.address.host.clone(),
                port: self.address.port,
            });
        }
        Ok(())
    }

    fn write(&mut self, bytes: Vec<u8>, tag: u64) {
        let (auto, _) = self.record(TransportCall::Write(bytes));
        if auto {
            self.sink.emit(TransportEvent::WriteCompleted(tag));
        }
    }

    fn disconnect(&mut self) {
        let (auto, _) = self.record(TransportCall::Disconnect);
        if auto {
            self.sink.emit(TransportEvent::Disconnected(None));
        }
    }
}

/// Probe with a fixed answer per address
///
/// Reachable addresses answer after `latency`, silent ones never answer,
/// everything else is refused at once.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProbe {
    reachable: HashSet<DeviceAddress>,
    silent: HashSet<DeviceAddress>,
    latency: Duration,
}

impl ScriptedProbe {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    pub fn reachable(mut self, address: DeviceAddress) -> Self {
        self.reachable.insert(address);
        self
    }

    pub fn silent(mut self, address: DeviceAddress) -> Self {
        self.silent.insert(address);
        self
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, address: &DeviceAddress) -> PrintResult<()> {
        if self.reachable.contains(address) {
            tokio::time::sleep(self.latency).await;
            return Ok(());
        }
        if self.silent.contains(address) {
            std::future::pending::<()>().await;
        }
        Err(PrintError::Connection(format!("{}: refused", address)))
    }
}
