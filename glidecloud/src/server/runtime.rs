//! The server event loop.
//!
//! One task owns the [`Server`] and multiplexes the UDP socket, the OGN
//! report channel, the expiry deadlines, the snapshot interval and process
//! signals. The OGN client runs as a separate task that only talks to the
//! loop through its channel.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::ServerConfig;
use super::dispatch::Server;
use super::error::ServerError;
use crate::ogn::{OgnClient, OgnClientConfig};
use crate::persist::Database;

/// Capacity of the OGN report channel.
pub const REPORT_CHANNEL_CAPACITY: usize = 1024;

/// Receive buffer size; larger than any valid datagram so oversized ones
/// are seen whole and rejected by the decoder.
const RECEIVE_BUFFER_SIZE: usize = 4096;

/// A bound server ready to run.
pub struct ServerRuntime {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    server: Server<Arc<UdpSocket>>,
    database: Database,
    ogn: OgnClientConfig,
}

impl ServerRuntime {
    /// Load the database and bind the UDP socket.
    pub async fn bind(
        address: SocketAddr,
        config: ServerConfig,
        database: Database,
        ogn: OgnClientConfig,
    ) -> Result<Self, ServerError> {
        let state = database.load().map_err(ServerError::Load)?;

        let bind_error = |source| ServerError::Bind { address, source };
        let socket = UdpSocket::bind(address).await.map_err(bind_error)?;
        let local_addr = socket.local_addr().map_err(bind_error)?;
        let socket = Arc::new(socket);

        let server = Server::with_state(config, Arc::clone(&socket), state, Instant::now());
        Ok(Self {
            socket,
            local_addr,
            server,
            database,
            ogn,
        })
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run until a termination signal or `shutdown` is cancelled, then save.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let mut signals = Signals::new().map_err(ServerError::Signal)?;

        let (report_tx, mut report_rx) = mpsc::channel(REPORT_CHANNEL_CAPACITY);
        let ogn_cancel = shutdown.child_token();
        let ogn_task = if self.ogn.enabled {
            Some(OgnClient::new(self.ogn.clone(), report_tx, ogn_cancel.clone()).start())
        } else {
            drop(report_tx);
            None
        };
        let mut reports_open = ogn_task.is_some();

        let period = self.server.config().save_interval;
        let mut save = interval_at(tokio::time::Instant::now() + period, period);
        save.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            address = %self.local_addr,
            ogn = self.ogn.enabled,
            "Server started"
        );
        self.server.log_summary();

        let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
        loop {
            let sweep = self.server.next_sweep();
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => self.server.handle_datagram(&buf[..len], from, Instant::now()),
                    Err(e) => debug!(error = %e, "UDP receive failed"),
                },
                report = report_rx.recv(), if reports_open => match report {
                    Some(report) => self.server.apply_traffic_report(report, Instant::now()),
                    None => {
                        debug!("OGN report channel closed");
                        reports_open = false;
                    }
                },
                _ = sleep_until(sweep) => self.server.run_due_sweeps(Instant::now()),
                _ = save.tick() => self.save(),
                action = signals.recv() => match action {
                    SignalAction::Shutdown(name) => {
                        info!(signal = name, "Received termination signal");
                        break;
                    }
                    SignalAction::Save => {
                        info!("Received SIGHUP, saving");
                        self.save();
                    }
                    SignalAction::Dump => self.dump(),
                },
            }
        }

        ogn_cancel.cancel();
        drop(report_rx);
        if let Some(task) = ogn_task {
            if let Err(e) = task.await {
                warn!(error = %e, "OGN client task failed");
            }
        }

        self.save();
        self.server.log_summary();
        info!("Server stopped");
        Ok(())
    }

    fn save(&self) {
        if let Err(e) = self.database.save(self.server.registries()) {
            warn!(error = %e, "Failed to save database");
        }
    }

    fn dump(&self) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Err(e) = self.server.dump_clients(&mut out, Instant::now()) {
            warn!(error = %e, "Failed to dump clients");
        }
    }
}

/// Sleep until `deadline`, or forever without one.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

/// What a received signal asks the server to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalAction {
    Shutdown(&'static str),
    Save,
    Dump,
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
    user1: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn new() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
            hangup: signal(SignalKind::hangup())?,
            user1: signal(SignalKind::user_defined1())?,
        })
    }

    async fn recv(&mut self) -> SignalAction {
        tokio::select! {
            _ = self.interrupt.recv() => SignalAction::Shutdown("SIGINT"),
            _ = self.terminate.recv() => SignalAction::Shutdown("SIGTERM"),
            _ = self.quit.recv() => SignalAction::Shutdown("SIGQUIT"),
            _ = self.hangup.recv() => SignalAction::Save,
            _ = self.user1.recv() => SignalAction::Dump,
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn new() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> SignalAction {
        match tokio::signal::ctrl_c().await {
            Ok(()) => SignalAction::Shutdown("Ctrl+C"),
            Err(e) => {
                warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending().await
            }
        }
    }
}
