//! Tunables of the dispatch rules and periodic maintenance.

use std::time::Duration;

/// Default radius for traffic requests, in meters.
pub const DEFAULT_TRAFFIC_QUERY_RADIUS: f64 = 30_000.0;

/// Default radius for pushing a client's fix to others, in meters.
pub const DEFAULT_TRAFFIC_NOTIFY_RADIUS: f64 = 50_000.0;

/// Default radius for thermal and wave requests, in meters.
pub const DEFAULT_THERMAL_QUERY_RADIUS: f64 = 20_000.0;

/// Default radius for pushing a new thermal or wave, in meters.
pub const DEFAULT_THERMAL_NOTIFY_RADIUS: f64 = 10_000.0;

pub const DEFAULT_MAX_TRAFFIC_RESULTS: usize = 64;
pub const DEFAULT_MAX_THERMAL_RESULTS: usize = 256;

/// Configuration for [`Server`](super::Server).
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub traffic_query_radius: f64,
    pub traffic_notify_radius: f64,
    /// Only traffic seen this recently is reported.
    pub traffic_freshness: Duration,
    pub max_traffic_results: usize,

    pub thermal_query_radius: f64,
    pub thermal_notify_radius: f64,
    /// Only thermals and waves submitted this recently are reported.
    pub thermal_freshness: Duration,
    pub max_thermal_results: usize,

    /// How long a request keeps a client subscribed to pushes.
    pub subscription_duration: Duration,

    pub client_max_age: Duration,
    pub thermal_max_age: Duration,
    pub wave_max_age: Duration,
    pub traffic_max_age: Duration,

    /// Interval of the expiry sweeps.
    pub expiry_check_interval: Duration,

    /// Interval of state snapshots.
    pub save_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            traffic_query_radius: DEFAULT_TRAFFIC_QUERY_RADIUS,
            traffic_notify_radius: DEFAULT_TRAFFIC_NOTIFY_RADIUS,
            traffic_freshness: Duration::from_secs(2 * 60),
            max_traffic_results: DEFAULT_MAX_TRAFFIC_RESULTS,
            thermal_query_radius: DEFAULT_THERMAL_QUERY_RADIUS,
            thermal_notify_radius: DEFAULT_THERMAL_NOTIFY_RADIUS,
            thermal_freshness: Duration::from_secs(20 * 60),
            max_thermal_results: DEFAULT_MAX_THERMAL_RESULTS,
            subscription_duration: Duration::from_secs(5 * 60),
            client_max_age: Duration::from_secs(10 * 60),
            thermal_max_age: Duration::from_secs(30 * 60),
            wave_max_age: Duration::from_secs(30 * 60),
            traffic_max_age: Duration::from_secs(15 * 60),
            expiry_check_interval: Duration::from_secs(5 * 60),
            save_interval: Duration::from_secs(60),
        }
    }
}
