//! Discovery scanner
//!
//! Probes every configured port of a host concurrently. Each probe is
//! raced against a timeout timer; whichever reports first settles the
//! probe and the other report is ignored.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use netprint_escpos::{DeviceAddress, Probe};
use tracing::{debug, info, trace};

use super::message::{FleetMessage, Mailbox};

/// Identity of one probe attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ProbeKey {
    pub address: DeviceAddress,
    attempt: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProbeOutcome {
    Reachable,
    Unreachable,
    TimedOut,
}

pub(crate) struct DiscoveryScanner {
    probe: Arc<dyn Probe>,
    ports: Vec<u16>,
    timeout: Duration,
    in_flight: HashSet<ProbeKey>,
    next_attempt: u64,
}

impl DiscoveryScanner {
    pub(crate) fn new(probe: Arc<dyn Probe>, ports: Vec<u16>, timeout: Duration) -> Self {
        Self {
            probe,
            ports,
            timeout,
            in_flight: HashSet::new(),
            next_attempt: 0,
        }
    }

    /// Start one probe per configured port of `host`
    pub(crate) fn probe_host(&mut self, host: &str, mailbox: &Mailbox) {
        debug!(host, ports = ?self.ports, "Probing host");
        for &port in &self.ports {
            self.next_attempt += 1;
            let key = ProbeKey {
                address: DeviceAddress::new(host, port),
                attempt: self.next_attempt,
            };
            self.in_flight.insert(key.clone());

            let probe = self.probe.clone();
            let timeout = self.timeout;
            let reporter = mailbox.clone();
            let probe_key = key.clone();
            tokio::spawn(async move {
                let attempt = tokio::time::timeout(timeout, probe.probe(&probe_key.address));
                let outcome = match attempt.await {
                    Ok(Ok(())) => ProbeOutcome::Reachable,
                    Ok(Err(e)) => {
                        trace!(addr = %probe_key.address, error = %e, "Probe failed");
                        ProbeOutcome::Unreachable
                    }
                    Err(_) => ProbeOutcome::TimedOut,
                };
                reporter.post(FleetMessage::ProbeFinished {
                    key: probe_key,
                    outcome,
                });
            });

            mailbox.post_after(
                timeout,
                FleetMessage::ProbeFinished {
                    key,
                    outcome: ProbeOutcome::TimedOut,
                },
            );
        }
    }

    /// Settle a probe; returns the address on first successful completion
    ///
    /// Completions for probes that already settled are ignored.
    pub(crate) fn complete(
        &mut self,
        key: &ProbeKey,
        outcome: ProbeOutcome,
    ) -> Option<DeviceAddress> {
        if !self.in_flight.remove(key) {
            trace!(addr = %key.address, ?outcome, "Late probe completion ignored");
            return None;
        }
        match outcome {
            ProbeOutcome::Reachable => {
                info!(addr = %key.address, "Printer discovered");
                Some(key.address.clone())
            }
            ProbeOutcome::Unreachable | ProbeOutcome::TimedOut => {
                debug!(addr = %key.address, ?outcome, "Nothing listening");
                None
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::testing::ScriptedProbe;
    use tokio::sync::mpsc;

    fn scanner(probe: ScriptedProbe) -> DiscoveryScanner {
        DiscoveryScanner::new(
            Arc::new(probe),
            vec![9100, 8100, 6100],
            Duration::from_millis(200),
        )
    }

    async fn settle(
        scanner: &mut DiscoveryScanner,
        rx: &mut mpsc::UnboundedReceiver<FleetMessage>,
        reports: usize,
    ) -> Vec<DeviceAddress> {
        let mut found = Vec::new();
        for _ in 0..reports {
            match rx.recv().await {
                Some(FleetMessage::ProbeFinished { key, outcome }) => {
                    found.extend(scanner.complete(&key, outcome));
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }
        found
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_open_port() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mailbox = Mailbox::new(&tx);
        let probe = ScriptedProbe::new(Duration::from_millis(20))
            .reachable(DeviceAddress::new("10.0.0.5", 9100))
            .silent(DeviceAddress::new("10.0.0.5", 8100));
        let mut scanner = scanner(probe);

        scanner.probe_host("10.0.0.5", &mailbox);
        assert_eq!(scanner.in_flight(), 3);

        // Each port reports twice: once from the probe, once from its timer
        let found = settle(&mut scanner, &mut rx, 6).await;
        assert_eq!(found, vec![DeviceAddress::new("10.0.0.5", 9100)]);
        assert_eq!(scanner.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_reported_before_timeout() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mailbox = Mailbox::new(&tx);
        let probe = ScriptedProbe::new(Duration::from_millis(20))
            .reachable(DeviceAddress::new("10.0.0.7", 9100));
        let mut scanner =
            DiscoveryScanner::new(Arc::new(probe), vec![9100], Duration::from_millis(200));

        let started = tokio::time::Instant::now();
        scanner.probe_host("10.0.0.7", &mailbox);
        let found = settle(&mut scanner, &mut rx, 1).await;
        assert_eq!(found, vec![DeviceAddress::new("10.0.0.7", 9100)]);
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_scans_are_independent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mailbox = Mailbox::new(&tx);
        let probe = ScriptedProbe::new(Duration::ZERO).reachable(DeviceAddress::new("h", 9100));
        let mut scanner =
            DiscoveryScanner::new(Arc::new(probe), vec![9100], Duration::from_millis(200));

        scanner.probe_host("h", &mailbox);
        scanner.probe_host("h", &mailbox);
        assert_eq!(scanner.in_flight(), 2);

        let found = settle(&mut scanner, &mut rx, 4).await;
        assert_eq!(found.len(), 2);
        assert_eq!(scanner.in_flight(), 0);
    }

    #[test]
    fn test_late_completion_is_noop() {
        let probe = ScriptedProbe::default();
        let mut scanner =
            DiscoveryScanner::new(Arc::new(probe), vec![9100], Duration::from_millis(200));
        let key = ProbeKey {
            address: DeviceAddress::new("h", 9100),
            attempt: 1,
        };
        scanner.in_flight.insert(key.clone());

        assert!(scanner.complete(&key, ProbeOutcome::TimedOut).is_none());
        assert_eq!(scanner.in_flight(), 0);
        assert!(scanner.complete(&key, ProbeOutcome::Reachable).is_none());
    }
}
