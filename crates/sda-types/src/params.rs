//! Operational protocol parameters carried in `ALL_ALL_PARAMETERS` and
//! loaded from the protocol TOML file.

use serde::{Deserialize, Serialize};

fn default_payload_size() -> usize {
    1024
}
fn default_cell_size_down() -> usize {
    1024
}
fn default_relay_window_size() -> usize {
    10
}
fn default_relay_reporting_limit() -> i32 {
    -1
}
fn default_trustee_sleep_ms() -> u64 {
    0
}
fn default_open_closed_min_delay_ms() -> u64 {
    0
}
fn default_relay_max_failed_rounds() -> u32 {
    10
}
fn default_relay_processing_loop_sleep_ms() -> u64 {
    0
}
fn default_relay_round_timeout_ms() -> u64 {
    5000
}
fn default_trustee_cache_low_bound() -> usize {
    1
}
fn default_trustee_cache_high_bound() -> usize {
    100
}
fn default_protocol_version() -> String {
    "1.0".to_string()
}
fn default_relay_egress_port() -> u16 {
    8080
}
fn default_client_ingress_port() -> u16 {
    8090
}

/// Every operational knob recognized in the protocol TOML file (`prifi.toml`).
/// Field names mirror the upstream TOML keys, translated to `snake_case` per
/// Rust convention; two fields are renamed outright for clarity
/// (`SocksClientPort` -> `relay_egress_port`, `SocksServerPort` ->
/// `client_ingress_port`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParameters {
    pub payload_size: usize,
    pub cell_size_down: usize,
    pub relay_window_size: usize,
    pub relay_use_open_closed_slots: bool,
    pub relay_use_dummy_data_down: bool,
    pub relay_reporting_limit: i32,
    pub use_udp: bool,
    pub do_latency_tests: bool,
    /// Renamed from `SocksClientPort`: the relay's egress bind port.
    pub relay_egress_port: u16,
    /// Renamed from `SocksServerPort`: the client's ingress bind port.
    pub client_ingress_port: u16,
    pub dc_net_type: String,
    pub replay_pcap: bool,
    pub pcap_folder: String,
    pub trustee_sleep_time_between_messages_ms: u64,
    pub trustee_always_slow_down: bool,
    pub trustee_never_slow_down: bool,
    pub simul_delay_between_clients_ms: u64,
    pub disruption_protection_enabled: bool,
    pub equivocation_protection_enabled: bool,
    pub open_closed_slots_min_delay_between_requests_ms: u64,
    pub relay_max_number_of_consecutive_failed_rounds: u32,
    pub relay_processing_loop_sleep_time_ms: u64,
    pub relay_round_timeout_ms: u64,
    pub relay_trustee_cache_low_bound: usize,
    pub relay_trustee_cache_high_bound: usize,
    pub verbose_ingress_egress_servers: bool,
    pub enforce_same_version_on_nodes: bool,
    pub force_console_color: bool,
    pub override_log_level: i32,
    pub protocol_version: String,
}

impl Default for ProtocolParameters {
    fn default() -> Self {
        Self {
            payload_size: default_payload_size(),
            cell_size_down: default_cell_size_down(),
            relay_window_size: default_relay_window_size(),
            relay_use_open_closed_slots: false,
            relay_use_dummy_data_down: false,
            relay_reporting_limit: default_relay_reporting_limit(),
            use_udp: true,
            do_latency_tests: false,
            relay_egress_port: default_relay_egress_port(),
            client_ingress_port: default_client_ingress_port(),
            dc_net_type: "simple".to_string(),
            replay_pcap: false,
            pcap_folder: String::new(),
            trustee_sleep_time_between_messages_ms: default_trustee_sleep_ms(),
            trustee_always_slow_down: false,
            trustee_never_slow_down: false,
            simul_delay_between_clients_ms: 0,
            disruption_protection_enabled: false,
            equivocation_protection_enabled: false,
            open_closed_slots_min_delay_between_requests_ms: default_open_closed_min_delay_ms(),
            relay_max_number_of_consecutive_failed_rounds: default_relay_max_failed_rounds(),
            relay_processing_loop_sleep_time_ms: default_relay_processing_loop_sleep_ms(),
            relay_round_timeout_ms: default_relay_round_timeout_ms(),
            relay_trustee_cache_low_bound: default_trustee_cache_low_bound(),
            relay_trustee_cache_high_bound: default_trustee_cache_high_bound(),
            verbose_ingress_egress_servers: false,
            enforce_same_version_on_nodes: true,
            force_console_color: false,
            override_log_level: -1,
            protocol_version: default_protocol_version(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let params = ProtocolParameters::default();
        let text = toml::to_string(&params).expect("serialize");
        let restored: ProtocolParameters = toml::from_str(&text).expect("deserialize");
        assert_eq!(params, restored);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let restored: ProtocolParameters = toml::from_str("payload_size = 2048").unwrap();
        assert_eq!(restored.payload_size, 2048);
        assert_eq!(restored.relay_window_size, default_relay_window_size());
    }
}
