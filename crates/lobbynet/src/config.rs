use std::time::Duration;

use clap::Args;
use lobbynet_proto::constants::ADDRESS_PREFIX;
use lobbynet_proto::limits::{
    self, DEFAULT_MAX_DEVICE_COUNT, DEFAULT_MAX_DEVICES_PER_USER, DEFAULT_MAX_ENDPOINTS_PER_DEVICE,
    DEFAULT_MAX_USER_COUNT, DEFAULT_MAX_USERS_PER_DEVICE, DEFAULT_SOCKET_QUEUE_CAPACITY,
    JOIN_RETRY_MAX_ATTEMPTS,
};
use lobbynet_proto::types::{DirectPeerConnectivity, NetworkConfiguration};
use tracing::{error, warn};

#[derive(Args, Debug, Clone)]
pub struct OnlineConfig {
    /// Title id passed to the service on initialize
    #[arg(long, default_value = "lobbynet-title")]
    pub title_id: String,

    /// Maximum devices in one network
    #[arg(long, default_value_t = DEFAULT_MAX_DEVICE_COUNT)]
    pub max_device_count: u32,

    #[arg(long, default_value_t = DEFAULT_MAX_DEVICES_PER_USER)]
    pub max_devices_per_user: u32,

    #[arg(long, default_value_t = DEFAULT_MAX_ENDPOINTS_PER_DEVICE)]
    pub max_endpoints_per_device: u32,

    /// Maximum users in one network
    #[arg(long, default_value_t = DEFAULT_MAX_USER_COUNT)]
    pub max_user_count: u32,

    #[arg(long, default_value_t = DEFAULT_MAX_USERS_PER_DEVICE)]
    pub max_users_per_device: u32,

    /// Direct peer connectivity options, e.g. `SamePlatformType,AnyEntityLoginProvider`
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = [String::from("AnyPlatformType"), String::from("AnyEntityLoginProvider")]
    )]
    pub direct_peer_connectivity: Vec<String>,

    /// Inbound packet queue size per virtual socket (rounded up to a power of two)
    #[arg(long, default_value_t = DEFAULT_SOCKET_QUEUE_CAPACITY)]
    pub socket_queue_capacity: usize,

    /// Interval between join-after-match attempts, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub join_retry_interval_ms: u64,

    /// Join-after-match attempts before giving up
    #[arg(long, default_value_t = JOIN_RETRY_MAX_ATTEMPTS)]
    pub join_retry_max_attempts: u32,

    /// Prefix of virtual socket addresses
    #[arg(long, default_value = ADDRESS_PREFIX)]
    pub address_prefix: String,

    /// Platform model advertised in lobby member properties
    #[arg(long, default_value = "Rust")]
    pub platform_model: String,
}

impl Default for OnlineConfig {
    fn default() -> Self {
        Self {
            title_id: "lobbynet-title".to_string(),
            max_device_count: DEFAULT_MAX_DEVICE_COUNT,
            max_devices_per_user: DEFAULT_MAX_DEVICES_PER_USER,
            max_endpoints_per_device: DEFAULT_MAX_ENDPOINTS_PER_DEVICE,
            max_user_count: DEFAULT_MAX_USER_COUNT,
            max_users_per_device: DEFAULT_MAX_USERS_PER_DEVICE,
            direct_peer_connectivity: vec![
                "AnyPlatformType".to_string(),
                "AnyEntityLoginProvider".to_string(),
            ],
            socket_queue_capacity: DEFAULT_SOCKET_QUEUE_CAPACITY,
            join_retry_interval_ms: 2000,
            join_retry_max_attempts: JOIN_RETRY_MAX_ATTEMPTS,
            address_prefix: ADDRESS_PREFIX.to_string(),
            platform_model: "Rust".to_string(),
        }
    }
}

impl OnlineConfig {
    /// Resolves the configured option names.
    ///
    /// An empty list, or any unknown name, falls back to the default set.
    pub fn direct_peer_connectivity(&self) -> DirectPeerConnectivity {
        if self.direct_peer_connectivity.is_empty() {
            warn!("direct peer connectivity options not provided, using default");
            return DirectPeerConnectivity::default();
        }

        let mut options = DirectPeerConnectivity::empty();
        for name in &self.direct_peer_connectivity {
            match DirectPeerConnectivity::from_option_name(name.trim()) {
                Some(flags) => options |= flags,
                None => {
                    error!(option = %name, "unknown direct peer connectivity option, using default");
                    return DirectPeerConnectivity::default();
                }
            }
        }
        options
    }

    pub fn network_configuration(&self) -> NetworkConfiguration {
        NetworkConfiguration {
            max_user_count: self.max_user_count,
            max_device_count: self.max_device_count,
            max_users_per_device: self.max_users_per_device,
            max_devices_per_user: self.max_devices_per_user,
            max_endpoints_per_device: self.max_endpoints_per_device,
            direct_peer_connectivity: self.direct_peer_connectivity(),
        }
    }

    pub fn socket_queue_capacity(&self) -> usize {
        limits::queue_capacity(self.socket_queue_capacity)
    }

    pub fn join_retry_interval(&self) -> Duration {
        Duration::from_millis(self.join_retry_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_defaults() {
        let config = OnlineConfig::default();
        let network = config.network_configuration();
        assert_eq!(network, NetworkConfiguration::default());
        assert_eq!(config.socket_queue_capacity(), 2048);
        assert_eq!(config.join_retry_interval(), Duration::from_secs(2));
    }

    #[test]
    fn unknown_option_keeps_default() {
        let config = OnlineConfig {
            direct_peer_connectivity: vec!["SamePlatformType".into(), "Sideways".into()],
            ..OnlineConfig::default()
        };
        assert_eq!(
            config.direct_peer_connectivity(),
            DirectPeerConnectivity::default()
        );
    }

    #[test]
    fn options_are_combined() {
        let config = OnlineConfig {
            direct_peer_connectivity: vec![
                "SamePlatformType".into(),
                "SameEntityLoginProvider".into(),
            ],
            ..OnlineConfig::default()
        };
        assert_eq!(
            config.direct_peer_connectivity(),
            DirectPeerConnectivity::SAME_PLATFORM_TYPE
                | DirectPeerConnectivity::SAME_ENTITY_LOGIN_PROVIDER
        );
    }

    #[test]
    fn empty_list_keeps_default() {
        let config = OnlineConfig {
            direct_peer_connectivity: Vec::new(),
            ..OnlineConfig::default()
        };
        assert_eq!(
            config.direct_peer_connectivity(),
            DirectPeerConnectivity::default()
        );
    }
}
