//! Per-datagram business rules.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use super::config::ServerConfig;
use crate::geo::GeoPoint;
use crate::ogn::TrafficReport;
use crate::protocol::{
    decode, encode, encode_response, send_logged, DatagramSink, Fix, Packet, ResponseAssembler,
    ResponseRecord, ThermalRecord, TrafficRecord, UserNameResponse, WaveRecord, SERVER_KEY,
    TRAFFIC_FLAG_NEAR,
};
use crate::registry::{
    Client, Registries, Thermal, Traffic, Wave, FIRST_TRAFFIC_ID, UNKNOWN_ALTITUDE,
};
use crate::time::{time_of_day_ms, WallClock};

/// The live-tracking server: registries plus the rules that mutate them.
///
/// All rules take `now` explicitly; the server never reads the clock for
/// decisions.
pub struct Server<S> {
    config: ServerConfig,
    sink: S,
    state: Registries,
    client_sweep_at: Option<Instant>,
    traffic_sweep_at: Option<Instant>,
}

impl<S: DatagramSink> Server<S> {
    pub fn new(config: ServerConfig, sink: S) -> Self {
        Self::with_state(config, sink, Registries::new(), Instant::now())
    }

    /// Start from restored registries.
    pub fn with_state(config: ServerConfig, sink: S, state: Registries, now: Instant) -> Self {
        let mut server = Self {
            config,
            sink,
            state,
            client_sweep_at: None,
            traffic_sweep_at: None,
        };
        server.arm_sweeps(now);
        server
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registries(&self) -> &Registries {
        &self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Decode and apply one inbound datagram.
    pub fn handle_datagram(&mut self, buf: &[u8], from: SocketAddr, now: Instant) {
        let datagram = match decode(buf) {
            Ok(datagram) => datagram,
            Err(e) => {
                trace!(%from, len = buf.len(), error = %e, "Dropping malformed datagram");
                return;
            }
        };

        let key = datagram.key;
        match datagram.packet {
            Packet::Ping { id } => self.on_ping(key, from, id, now),
            Packet::Fix(fix) => self.on_fix(key, from, &fix, now),
            Packet::TrafficRequest { flags } => self.on_traffic_request(key, from, flags, now),
            Packet::UserNameRequest { user_id } => {
                self.on_user_name_request(key, from, user_id, now)
            }
            Packet::ThermalSubmit(record) => self.on_thermal_submit(key, from, &record, now),
            Packet::WaveSubmit(record) => self.on_wave_submit(key, from, &record, now),
            Packet::ThermalRequest { .. } => self.on_thermal_request(key, from, now),
            Packet::WaveRequest { .. } => self.on_wave_request(key, from, now),
            other => trace!(
                %from,
                packet_type = ?other.packet_type(),
                "Ignoring response sent to the server"
            ),
        }

        self.arm_sweeps(now);
    }

    /// Record an aircraft seen on the OGN feed.
    pub fn apply_traffic_report(&mut self, report: TrafficReport, now: Instant) {
        let position = report.position;
        self.state.traffic.make_or_update(
            &report.device_id,
            report.database_id,
            position.location,
            now,
            |traffic| {
                traffic.database_id = report.database_id;
                traffic.altitude = position.altitude;
                traffic.track = position.track;
                traffic.ground_speed = position.ground_speed;
                traffic.climb_rate = position.climb_rate;
                traffic.turn_rate = position.turn_rate;
                traffic.aircraft_type = position.aircraft_type;
            },
        );
        self.arm_sweeps(now);
    }

    // =========================================================================
    // Rules
    // =========================================================================

    fn on_ping(&mut self, key: u64, from: SocketAddr, id: u16, now: Instant) {
        self.state.clients.make_or_update(key, from, now, |_| {});
        debug!(%from, id, "Ping");
        let ack = encode(SERVER_KEY, &Packet::Ack { id, flags: 0 });
        send_logged(&self.sink, &ack, from);
    }

    fn on_fix(&mut self, key: u64, from: SocketAddr, fix: &Fix, now: Instant) {
        let location = fix.location.filter(GeoPoint::is_valid);
        let entry = self.state.clients.make_or_update(key, from, now, |client| {
            if let Some(location) = location {
                client.location = Some(location);
                client.altitude = fix.altitude.unwrap_or(UNKNOWN_ALTITUDE);
                client.track = fix.track;
                client.vario = fix.vario;
            }
        });

        let client = entry.value;
        let Some(record) = client_record(client, entry.stamp) else {
            trace!(%from, "Fix without location");
            return;
        };
        debug!(%from, id = record.pilot_id, location = %record.location, "Fix");

        let targets: Vec<SocketAddr> = self
            .state
            .clients
            .query_within_range(record.location, self.config.traffic_notify_radius)
            .filter(|other| *other.key != key && other.value.wants_traffic(now))
            .map(|other| other.value.address)
            .collect();
        if targets.is_empty() {
            return;
        }

        let datagram = encode_response(SERVER_KEY, &[record]);
        for target in targets {
            send_logged(&self.sink, &datagram, target);
        }
    }

    fn on_traffic_request(&mut self, key: u64, from: SocketAddr, flags: u32, now: Instant) {
        let until = now + self.config.subscription_duration;
        let entry = self.state.clients.make_or_update(key, from, now, |client| {
            if client.location.is_some() {
                client.traffic_until = Some(until);
            }
        });
        let Some(center) = entry.value.location else {
            debug!(%from, "Traffic request without location");
            return;
        };

        if flags & TRAFFIC_FLAG_NEAR == 0 {
            return;
        }

        let radius = self.config.traffic_query_radius;
        let fresh = |stamp: Instant| is_fresh(stamp, now, self.config.traffic_freshness);
        let nearby_clients = self
            .state
            .clients
            .query_within_range(center, radius)
            .filter(|other| *other.key != key && fresh(other.stamp))
            .filter_map(|other| client_record(other.value, other.stamp));
        let nearby_traffic = self
            .state
            .traffic
            .query_within_range(center, radius)
            .filter(|other| fresh(other.stamp))
            .map(|other| traffic_record(other.value, other.stamp));

        let mut assembler = ResponseAssembler::new(&self.sink, from);
        assembler.extend(
            nearby_clients
                .chain(nearby_traffic)
                .take(self.config.max_traffic_results),
        );
        let packets = assembler.finish();
        debug!(%from, packets, "Traffic request");
    }

    fn on_user_name_request(&mut self, key: u64, from: SocketAddr, user_id: u32, now: Instant) {
        self.state.clients.make_or_update(key, from, now, |_| {});

        if user_id < FIRST_TRAFFIC_ID {
            debug!(%from, user_id, "User name request for a client id, not answered");
            return;
        }

        let response = match self.state.traffic.find_by_id(user_id) {
            Some(entry) => UserNameResponse::found(user_id, entry.key.as_str()),
            None => UserNameResponse::not_found(user_id),
        };
        let datagram = encode(SERVER_KEY, &Packet::UserNameResponse(response));
        send_logged(&self.sink, &datagram, from);
    }

    fn on_thermal_submit(
        &mut self,
        key: u64,
        from: SocketAddr,
        record: &ThermalRecord,
        now: Instant,
    ) {
        if self.state.clients.update(key, from, now, |_| {}).is_none() {
            debug!(%from, "Thermal from unknown client ignored");
            return;
        }
        if !record.bottom.is_valid() || !record.top.is_valid() {
            debug!(%from, "Thermal with invalid location ignored");
            return;
        }

        let thermal = Thermal::from_record(key, record);
        let id = self.state.thermals.insert(thermal, now);
        debug!(%from, id, top = %record.top, lift = record.lift, "Thermal submitted");

        self.notify_lift(key, record.top, std::slice::from_ref(record), now);
    }

    fn on_wave_submit(&mut self, key: u64, from: SocketAddr, record: &WaveRecord, now: Instant) {
        if self.state.clients.update(key, from, now, |_| {}).is_none() {
            debug!(%from, "Wave from unknown client ignored");
            return;
        }
        if !record.a.is_valid() || !record.b.is_valid() {
            debug!(%from, "Wave with invalid location ignored");
            return;
        }

        let wave = Wave::from_record(key, record);
        let center = record.a.midpoint(&record.b);
        let id = self.state.waves.insert(wave, now);
        debug!(%from, id, %center, lift = record.lift, "Wave submitted");

        self.notify_lift(key, center, std::slice::from_ref(record), now);
    }

    /// Push a new thermal or wave to subscribed clients near `center`.
    fn notify_lift<R: ResponseRecord>(
        &self,
        owner: u64,
        center: GeoPoint,
        records: &[R],
        now: Instant,
    ) {
        let datagram = encode_response(SERVER_KEY, records);
        self.state
            .clients
            .query_within_range(center, self.config.thermal_notify_radius)
            .filter(|other| *other.key != owner && other.value.wants_thermals(now))
            .for_each(|other| send_logged(&self.sink, &datagram, other.value.address));
    }

    /// Extend the lift subscription of a located client and return its
    /// location. Clients without a location are only touched.
    fn subscribe_lift(&mut self, key: u64, from: SocketAddr, now: Instant) -> Option<GeoPoint> {
        let until = now + self.config.subscription_duration;
        self.state
            .clients
            .make_or_update(key, from, now, |client| {
                if client.location.is_some() {
                    client.thermals_until = Some(until);
                }
            })
            .value
            .location
    }

    fn on_thermal_request(&mut self, key: u64, from: SocketAddr, now: Instant) {
        let Some(center) = self.subscribe_lift(key, from, now) else {
            debug!(%from, "Thermal request without location");
            return;
        };

        let records = self
            .state
            .thermals
            .query_within_range(center, self.config.thermal_query_radius)
            .filter(|entry| {
                entry.value.owner != key
                    && is_fresh(entry.stamp, now, self.config.thermal_freshness)
            })
            .map(|entry| entry.value.to_record())
            .take(self.config.max_thermal_results);

        let mut assembler = ResponseAssembler::new(&self.sink, from);
        assembler.extend(records);
        let packets = assembler.finish();
        debug!(%from, packets, "Thermal request");
    }

    fn on_wave_request(&mut self, key: u64, from: SocketAddr, now: Instant) {
        let Some(center) = self.subscribe_lift(key, from, now) else {
            debug!(%from, "Wave request without location");
            return;
        };

        let records = self
            .state
            .waves
            .query_within_range(center, self.config.thermal_query_radius)
            .filter(|entry| {
                entry.value.owner != key
                    && is_fresh(entry.stamp, now, self.config.thermal_freshness)
            })
            .map(|entry| entry.value.to_record())
            .take(self.config.max_thermal_results);

        let mut assembler = ResponseAssembler::new(&self.sink, from);
        assembler.extend(records);
        let packets = assembler.finish();
        debug!(%from, packets, "Wave request");
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Remove idle clients and old thermals and waves.
    pub fn expire_clients(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        if let Some(cutoff) = now.checked_sub(self.config.client_max_age) {
            removed += self.state.clients.expire(cutoff);
        }
        if let Some(cutoff) = now.checked_sub(self.config.thermal_max_age) {
            removed += self.state.thermals.expire(cutoff);
        }
        if let Some(cutoff) = now.checked_sub(self.config.wave_max_age) {
            removed += self.state.waves.expire(cutoff);
        }
        removed
    }

    /// Remove OGN traffic not heard from recently.
    pub fn expire_traffic(&mut self, now: Instant) -> usize {
        now.checked_sub(self.config.traffic_max_age)
            .map_or(0, |cutoff| self.state.traffic.expire(cutoff))
    }

    /// Earliest pending sweep, if any.
    pub fn next_sweep(&self) -> Option<Instant> {
        match (self.client_sweep_at, self.traffic_sweep_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Run the sweeps that are due at `now` and re-arm them.
    pub fn run_due_sweeps(&mut self, now: Instant) {
        if self.client_sweep_at.is_some_and(|at| at <= now) {
            self.client_sweep_at = None;
            let removed = self.expire_clients(now);
            debug!(
                removed,
                clients = self.state.clients.len(),
                thermals = self.state.thermals.len(),
                waves = self.state.waves.len(),
                "Client sweep"
            );
        }
        if self.traffic_sweep_at.is_some_and(|at| at <= now) {
            self.traffic_sweep_at = None;
            let removed = self.expire_traffic(now);
            debug!(removed, traffic = self.state.traffic.len(), "Traffic sweep");
        }
        self.arm_sweeps(now);
    }

    /// Sweeps only run while there is something to sweep. The client sweep
    /// also expires thermals and waves.
    fn arm_sweeps(&mut self, now: Instant) {
        let interval = self.config.expiry_check_interval;
        let lift_or_clients = !self.state.clients.is_empty()
            || !self.state.thermals.is_empty()
            || !self.state.waves.is_empty();
        if self.client_sweep_at.is_none() && lift_or_clients {
            self.client_sweep_at = Some(now + interval);
        }
        if self.traffic_sweep_at.is_none() && !self.state.traffic.is_empty() {
            self.traffic_sweep_at = Some(now + interval);
        }
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Write one line per client. Secret keys are never printed.
    pub fn dump_clients<W: io::Write>(&self, writer: &mut W, now: Instant) -> io::Result<()> {
        writeln!(writer, "{} clients", self.state.clients.len())?;
        for entry in self.state.clients.iter() {
            let client = entry.value;
            let age = now.saturating_duration_since(entry.stamp).as_secs();
            match client.location {
                Some(location) => write!(writer, "id={} location={}", client.id, location)?,
                None => write!(writer, "id={} location=unknown", client.id)?,
            }
            writeln!(
                writer,
                " altitude={} age={}s address={}",
                client.altitude, age, client.address
            )?;
        }
        Ok(())
    }

    /// Log a one-line summary of the registries.
    pub fn log_summary(&self) {
        info!(
            clients = self.state.clients.len(),
            thermals = self.state.thermals.len(),
            waves = self.state.waves.len(),
            traffic = self.state.traffic.len(),
            "Server state"
        );
    }
}

fn is_fresh(stamp: Instant, now: Instant, freshness: Duration) -> bool {
    now.saturating_duration_since(stamp) <= freshness
}

fn stamp_time_of_day(stamp: Instant) -> u32 {
    time_of_day_ms(WallClock::now().to_system_time(stamp))
}

fn client_record(client: &Client, stamp: Instant) -> Option<TrafficRecord> {
    let location = client.location?;
    Some(TrafficRecord {
        pilot_id: client.id,
        time_of_day_ms: stamp_time_of_day(stamp),
        location,
        altitude: client.altitude,
        track: client.track.unwrap_or(0),
        turn_rate: 0.0,
        vario: client.vario.unwrap_or(0.0),
    })
}

fn traffic_record(traffic: &Traffic, stamp: Instant) -> TrafficRecord {
    TrafficRecord {
        pilot_id: traffic.id,
        time_of_day_ms: stamp_time_of_day(stamp),
        location: traffic.location,
        altitude: traffic.altitude.map_or(UNKNOWN_ALTITUDE, |a| {
            a.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
        }),
        track: traffic.track.unwrap_or(0),
        turn_rate: traffic.turn_rate.unwrap_or(0.0),
        vario: traffic.climb_rate.unwrap_or(0.0),
    }
}
