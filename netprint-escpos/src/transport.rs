//! Transport adapters for sending ESC/POS data
//!
//! A [`Transport`] is a long-lived socket to one printer. Operations are
//! issued synchronously and complete asynchronously: the outcome of every
//! connect, write and disconnect arrives later as a [`TransportEvent`] on
//! the [`TransportSink`] the transport was created with.
//!
//! Supports:
//! - Network printers (raw TCP, usually port 9100)

use crate::address::DeviceAddress;
use crate::error::{PrintError, PrintResult};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, info_span, trace, warn};

/// Completion notification from a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Socket is open
    Connected { host: String, port: u16 },
    /// Socket closed; `None` when closed on request
    Disconnected(Option<String>),
    /// Bytes written with this tag were flushed to the socket
    WriteCompleted(u64),
}

/// Receiver side of transport notifications
#[derive(Clone)]
pub struct TransportSink(Arc<dyn Fn(TransportEvent) + Send + Sync>);

impl TransportSink {
    pub fn new(f: impl Fn(TransportEvent) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn emit(&self, event: TransportEvent) {
        (self.0)(event)
    }
}

impl fmt::Debug for TransportSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransportSink")
    }
}

/// Trait for printer transports
pub trait Transport: Send {
    /// Start connecting; `Err` when the attempt could not even be issued
    fn connect(&mut self) -> PrintResult<()>;

    /// Queue bytes for writing (fire-and-forget, completion reported by tag)
    fn write(&mut self, bytes: Vec<u8>, tag: u64);

    /// Close the socket; a `Disconnected` event follows if one was open
    fn disconnect(&mut self);
}

/// Creates one transport per device
pub trait TransportFactory: Send + Sync {
    fn create(&self, address: &DeviceAddress, sink: TransportSink) -> Box<dyn Transport>;
}

/// One-shot reachability check
#[async_trait]
pub trait Probe: Send + Sync {
    /// `Ok` when a connection could be opened (and was closed again)
    async fn probe(&self, address: &DeviceAddress) -> PrintResult<()>;
}

enum SessionCommand {
    Write { bytes: Vec<u8>, tag: u64 },
    Disconnect,
}

/// Network printer transport over raw TCP
///
/// Each successful `connect` spawns a session task that owns the socket.
#[derive(Debug)]
pub struct TcpTransport {
    address: DeviceAddress,
    sink: TransportSink,
    timeout: Option<Duration>,
    session: Option<mpsc::UnboundedSender<SessionCommand>>,
}

impl TcpTransport {
    pub fn new(address: DeviceAddress, sink: TransportSink) -> Self {
        Self {
            address,
            sink,
            timeout: None,
            session: None,
        }
    }

    /// Set connection timeout (default: wait for the OS)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the printer address
    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    fn session_alive(&self) -> bool {
        self.session.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Spawn the session task on the current runtime
    fn open_session(&mut self) -> PrintResult<()> {
        if !self.address.has_valid_port() {
            return Err(PrintError::InvalidAddress(self.address.to_string()));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PrintError::Connection(format!("{}: {}", self.address, e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let span = info_span!("tcp_session", addr = %self.address);
        runtime.spawn(
            run_session(self.address.clone(), self.timeout, rx, self.sink.clone()).instrument(span),
        );
        self.session = Some(tx);
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self) -> PrintResult<()> {
        // A live session settles the caller through its own events
        if self.session_alive() {
            return Err(PrintError::AlreadyConnected(self.address.to_string()));
        }
        self.open_session().inspect_err(|e| {
            self.sink.emit(TransportEvent::Disconnected(Some(e.to_string())));
        })
    }

    fn write(&mut self, bytes: Vec<u8>, tag: u64) {
        let len = bytes.len();
        let sent = match &self.session {
            Some(tx) => tx.send(SessionCommand::Write { bytes, tag }).is_ok(),
            None => false,
        };
        if !sent {
            warn!(addr = %self.address, len, tag, "Write dropped, no open session");
        }
    }

    fn disconnect(&mut self) {
        if let Some(tx) = self.session.take() {
            let _ = tx.send(SessionCommand::Disconnect);
        }
    }
}

/// Open a TCP stream, bounded by `timeout` when given
async fn open_stream(address: &DeviceAddress, timeout: Option<Duration>) -> PrintResult<TcpStream> {
    let connect = TcpStream::connect((address.host.as_str(), address.port));
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, connect)
            .await
            .map_err(|_| PrintError::Timeout(format!("Connection timeout: {}", address)))?,
        None => connect.await,
    };
    result.map_err(|e| PrintError::Connection(format!("{}: {}", address, e)))
}

async fn run_session(
    address: DeviceAddress,
    timeout: Option<Duration>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    sink: TransportSink,
) {
    debug!("Connecting to printer");

    let connect = open_stream(&address, timeout);
    tokio::pin!(connect);
    let mut queued = Vec::new();

    let stream = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok(stream) => break stream,
                Err(e) => {
                    warn!(error = %e, "Connect failed");
                    sink.emit(TransportEvent::Disconnected(Some(e.to_string())));
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(SessionCommand::Write { bytes, tag }) => queued.push((bytes, tag)),
                Some(SessionCommand::Disconnect) | None => {
                    debug!("Connect aborted");
                    sink.emit(TransportEvent::Disconnected(None));
                    return;
                }
            },
        }
    };

    info!("Connected");
    sink.emit(TransportEvent::Connected {
        host: address.host.clone(),
        port: address.port,
    });

    let (mut reader, mut writer) = stream.into_split();

    for (bytes, tag) in queued {
        if let Err(e) = write_tagged(&mut writer, &bytes, tag, &sink).await {
            sink.emit(TransportEvent::Disconnected(Some(e.to_string())));
            return;
        }
    }

    let mut scratch = [0u8; 64];
    let reason = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SessionCommand::Write { bytes, tag }) => {
                    if let Err(e) = write_tagged(&mut writer, &bytes, tag, &sink).await {
                        break Some(e.to_string());
                    }
                }
                Some(SessionCommand::Disconnect) | None => {
                    let _ = writer.shutdown().await;
                    break None;
                }
            },
            read = reader.read(&mut scratch) => match read {
                Ok(0) => break Some("connection closed by printer".to_string()),
                // Status answers are not interpreted
                Ok(n) => trace!(bytes = n, "Ignoring bytes from printer"),
                Err(e) => break Some(e.to_string()),
            },
        }
    };

    match &reason {
        Some(error) => warn!(error = %error, "Disconnected"),
        None => info!("Disconnected"),
    }
    sink.emit(TransportEvent::Disconnected(reason));
}

async fn write_tagged(
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    bytes: &[u8],
    tag: u64,
    sink: &TransportSink,
) -> PrintResult<()> {
    writer.write_all(bytes).await?;
    writer.flush().await?;
    trace!(tag, len = bytes.len(), "Write completed");
    sink.emit(TransportEvent::WriteCompleted(tag));
    Ok(())
}

/// Creates [`TcpTransport`]s
#[derive(Debug, Clone, Default)]
pub struct TcpTransportFactory {
    connect_timeout: Option<Duration>,
}

impl TcpTransportFactory {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }
}

impl TransportFactory for TcpTransportFactory {
    fn create(&self, address: &DeviceAddress, sink: TransportSink) -> Box<dyn Transport> {
        Box::new(TcpTransport::new(address.clone(), sink).with_timeout(self.connect_timeout))
    }
}

/// Reachability probe over TCP
///
/// Opens a connection and drops it straight away.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, address: &DeviceAddress) -> PrintResult<()> {
        let stream = open_stream(address, None).await?;
        drop(stream);
        trace!(addr = %address, "Probe connected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    fn recording_sink() -> (TransportSink, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = TransportSink::new(move |event| {
            let _ = tx.send(event);
        });
        (sink, rx)
    }

    #[tokio::test]
    async fn test_connect_write_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            socket.read_to_end(&mut buf).await.unwrap();
            received_clone.lock().unwrap().extend(buf);
        });

        let (sink, mut events) = recording_sink();
        let mut transport = TcpTransport::new(DeviceAddress::new("127.0.0.1", port), sink);
        transport.connect().unwrap();

        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Connected {
                host: "127.0.0.1".to_string(),
                port
            })
        );

        transport.write(vec![0x1B, 0x40], 7);
        assert_eq!(events.recv().await, Some(TransportEvent::WriteCompleted(7)));

        transport.disconnect();
        assert_eq!(events.recv().await, Some(TransportEvent::Disconnected(None)));

        server.await.unwrap();
        assert_eq!(*received.lock().unwrap(), vec![0x1B, 0x40]);
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (sink, _events) = recording_sink();
        let mut transport = TcpTransport::new(DeviceAddress::new("127.0.0.1", port), sink);
        transport.connect().unwrap();
        assert!(matches!(
            transport.connect(),
            Err(PrintError::AlreadyConnected(_))
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_disconnect() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (sink, mut events) = recording_sink();
        let mut transport = TcpTransport::new(DeviceAddress::new("127.0.0.1", port), sink);
        transport.connect().unwrap();

        match events.recv().await {
            Some(TransportEvent::Disconnected(Some(_))) => {}
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_peer_close_reports_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let (sink, mut events) = recording_sink();
        let mut transport = TcpTransport::new(DeviceAddress::new("127.0.0.1", port), sink);
        transport.connect().unwrap();

        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::Connected { .. })
        ));
        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::Disconnected(Some(_)))
        ));
    }

    #[test]
    fn test_invalid_port_is_not_issued() {
        let (sink, mut events) = recording_sink();
        let mut transport = TcpTransport::new(DeviceAddress::new("127.0.0.1", 0), sink);
        assert!(matches!(
            transport.connect(),
            Err(PrintError::InvalidAddress(_))
        ));
        assert!(matches!(
            events.try_recv(),
            Ok(TransportEvent::Disconnected(Some(_)))
        ));
    }

    #[test]
    fn test_connect_without_runtime_reports_disconnect() {
        let (sink, mut events) = recording_sink();
        let mut transport = TcpTransport::new(DeviceAddress::new("127.0.0.1", 9100), sink);
        assert!(matches!(transport.connect(), Err(PrintError::Connection(_))));
        assert!(matches!(
            events.try_recv(),
            Ok(TransportEvent::Disconnected(Some(_)))
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tcp_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(TcpProbe.probe(&DeviceAddress::new("127.0.0.1", port)).await.is_ok());

        drop(listener);
        assert!(TcpProbe.probe(&DeviceAddress::new("127.0.0.1", port)).await.is_err());
    }
}
