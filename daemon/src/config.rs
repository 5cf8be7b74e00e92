//! Observer configuration

use serde::Serialize;
use utoipa::ToSchema;

/// Observer configuration
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObserverConfig {
    /// I/O image size in bytes (MB‖EB‖AB concatenation)
    pub image_size: usize,

    /// Minimum plausible cycle duration, below which a match is noise
    pub min_cycle_time_ms: u64,

    /// Initial Hamming-distance tolerance for cycle matching, in bytes
    pub starting_precision: u32,

    /// Cycle-search phase duration before the first tolerance escalation
    pub cycles_analyze_time_s: u64,

    /// Extra seconds added to the cycle-search deadline on each escalation
    pub cycles_analyze_time_add_s: u64,

    /// Tolerance, in ms, for considering two durations equal
    pub period_precision_ms: u64,

    /// Analyzer tick period
    pub tick_period_ms: u64,

    /// Inter-sample delay requested of the sampler when none is given at
    /// session start
    pub default_sample_period_ms: u64,

    /// Live-snapshot push cadence over the event stream
    pub push_data_ms: u64,

    /// Histogram/statistics push cadence over the event stream
    pub push_stats_ms: u64,

    /// Cycles push cadence over the event stream
    pub push_cycles_ms: u64,

    /// PLC transport read/write timeout
    pub transport_timeout_ms: u64,

    /// Consecutive sampler read failures (transport errors or empty reads)
    /// before the session is declared lost and disconnected
    pub max_consecutive_read_failures: u32,

    /// HTTP bind address
    pub bind_address: String,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            image_size: 384,
            min_cycle_time_ms: 10_000,
            starting_precision: 1,
            cycles_analyze_time_s: 30,
            cycles_analyze_time_add_s: 20,
            period_precision_ms: 100,
            tick_period_ms: 5_000,
            default_sample_period_ms: 10,
            push_data_ms: 500,
            push_stats_ms: 5_000,
            push_cycles_ms: 5_000,
            transport_timeout_ms: 5_000,
            max_consecutive_read_failures: 5,
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ObserverConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(ms) = std::env::var("S7OBS_MIN_CYCLE_TIME_MS") {
            if let Ok(val) = ms.parse() {
                config.min_cycle_time_ms = val;
            }
        }

        if let Ok(bytes) = std::env::var("S7OBS_STARTING_PRECISION") {
            if let Ok(val) = bytes.parse() {
                config.starting_precision = val;
            }
        }

        if let Ok(secs) = std::env::var("S7OBS_CYCLES_ANALYZE_TIME_S") {
            if let Ok(val) = secs.parse() {
                config.cycles_analyze_time_s = val;
            }
        }

        if let Ok(secs) = std::env::var("S7OBS_CYCLES_ANALYZE_TIME_ADD_S") {
            if let Ok(val) = secs.parse() {
                config.cycles_analyze_time_add_s = val;
            }
        }

        if let Ok(ms) = std::env::var("S7OBS_PERIOD_PRECISION_MS") {
            if let Ok(val) = ms.parse() {
                config.period_precision_ms = val;
            }
        }

        if let Ok(ms) = std::env::var("S7OBS_TICK_PERIOD_MS") {
            if let Ok(val) = ms.parse() {
                config.tick_period_ms = val;
            }
        }

        if let Ok(ms) = std::env::var("S7OBS_DEFAULT_SAMPLE_PERIOD_MS") {
            if let Ok(val) = ms.parse() {
                config.default_sample_period_ms = val;
            }
        }

        if let Ok(ms) = std::env::var("S7OBS_TRANSPORT_TIMEOUT_MS") {
            if let Ok(val) = ms.parse() {
                config.transport_timeout_ms = val;
            }
        }

        if let Ok(n) = std::env::var("S7OBS_MAX_CONSECUTIVE_READ_FAILURES") {
            if let Ok(val) = n.parse() {
                config.max_consecutive_read_failures = val;
            }
        }

        if let Ok(addr) = std::env::var("S7OBS_BIND_ADDRESS") {
            config.bind_address = addr;
        }

        config
    }
}
