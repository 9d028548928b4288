//! Persistent APRS-IS connection feeding parsed reports to the server.
//!
//! The client owns one TCP session at a time. Every failure (resolution,
//! connect, read, an empty line from the server) ends the session; the
//! client then waits for the reconnect delay and starts over. Lines that are
//! not UTF-8 or do not parse are dropped without ending the session. All
//! waits, including a send on a full report channel, race the cancellation
//! token so shutdown never has to wait for the network or the server.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::config::OgnClientConfig;
use super::error::OgnError;
use super::parser::{parse_line, TrafficReport};

/// How a session ended without an error.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Cancelled,
    ChannelClosed,
}

/// APRS-IS client task.
pub struct OgnClient {
    config: OgnClientConfig,
    report_tx: mpsc::Sender<TrafficReport>,
    cancel: CancellationToken,
}

impl OgnClient {
    pub fn new(
        config: OgnClientConfig,
        report_tx: mpsc::Sender<TrafficReport>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            report_tx,
            cancel,
        }
    }

    /// Spawn the client loop.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        info!(
            server = %self.config.server,
            port = self.config.port,
            "OGN client started"
        );

        loop {
            match self.session().await {
                Ok(SessionEnd::Cancelled) => break,
                Ok(SessionEnd::ChannelClosed) => {
                    debug!("Report channel closed, stopping OGN client");
                    break;
                }
                Err(e) => warn!(
                    error = %e,
                    retry_secs = self.config.reconnect_delay.as_secs(),
                    "OGN session ended"
                ),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }

        info!("OGN client stopped");
    }

    async fn session(&self) -> Result<SessionEnd, OgnError> {
        let Some(stream) = self.connect().await? else {
            return Ok(SessionEnd::Cancelled);
        };
        let (reader, mut writer) = stream.into_split();

        writer
            .write_all(self.config.login_line().as_bytes())
            .await?;

        let mut lines = BufReader::new(reader).split(b'\n');
        let period = self.config.keepalive_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                _ = keepalive.tick() => {
                    trace!("Sending APRS-IS keep-alive");
                    writer.write_all(b"#keepalive\n").await?;
                }
                segment = lines.next_segment() => {
                    let Some(mut segment) = segment? else {
                        return Err(OgnError::Closed);
                    };
                    if segment.last() == Some(&b'\r') {
                        segment.pop();
                    }
                    if segment.is_empty() {
                        return Err(OgnError::EmptyLine);
                    }
                    let Ok(line) = std::str::from_utf8(&segment) else {
                        trace!(len = segment.len(), "Ignoring APRS-IS line that is not UTF-8");
                        continue;
                    };
                    if line.starts_with('#') {
                        trace!(line = %line, "APRS-IS server comment");
                        continue;
                    }
                    let Some(report) = parse_line(line) else {
                        trace!(line = %line, "Ignoring APRS-IS line");
                        continue;
                    };
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                        sent = self.report_tx.send(report) => {
                            if sent.is_err() {
                                return Ok(SessionEnd::ChannelClosed);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Resolve the server and try each address in turn.
    ///
    /// Returns `Ok(None)` when cancelled.
    async fn connect(&self) -> Result<Option<TcpStream>, OgnError> {
        let host = (self.config.server.as_str(), self.config.port);
        let addresses: Vec<SocketAddr> = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(None),
            resolved = tokio::net::lookup_host(host) => resolved
                .map_err(|source| OgnError::Resolve {
                    server: self.config.server.clone(),
                    port: self.config.port,
                    source,
                })?
                .collect(),
        };
        if addresses.is_empty() {
            return Err(OgnError::NoAddress(self.config.server.clone()));
        }

        for address in addresses {
            debug!(%address, "Connecting to APRS-IS");
            let attempt = timeout(self.config.connect_timeout, TcpStream::connect(address));
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(None),
                result = attempt => result,
            };
            match result {
                Ok(Ok(stream)) => {
                    info!(%address, "Connected to APRS-IS");
                    return Ok(Some(stream));
                }
                Ok(Err(e)) => debug!(%address, error = %e, "APRS-IS connect failed"),
                Err(_) => debug!(%address, "APRS-IS connect timed out"),
            }
        }

        Err(OgnError::ConnectFailed(self.config.server.clone()))
    }
}
