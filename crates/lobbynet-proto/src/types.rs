//! Request and response payloads of the service traits.

use std::time::Duration;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use crate::ids::{EndpointId, EntityKey, LobbyId};
use crate::limits;

// ============================================================================
// Global configuration
// ============================================================================

/// Allocation hooks installed once before the service is initialized.
#[derive(Clone, Copy)]
pub struct MemoryHooks {
    pub alloc: fn(size: usize, tag: u32) -> *mut u8,
    pub free: fn(ptr: *mut u8, tag: u32),
}

impl std::fmt::Debug for MemoryHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHooks").finish_non_exhaustive()
    }
}

/// Categories of internal service threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub enum ThreadCategory {
    Audio,
    Networking,
}

/// Whether a thread category is driven by the service or by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkMode {
    #[default]
    Automatic,
    Manual,
}

// ============================================================================
// Networks
// ============================================================================

bitflags! {
    /// Which devices may connect to each other directly instead of through the relay.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DirectPeerConnectivity: u32 {
        const SAME_PLATFORM_TYPE = 1 << 0;
        const DIFFERENT_PLATFORM_TYPE = 1 << 1;
        const ANY_PLATFORM_TYPE = Self::SAME_PLATFORM_TYPE.bits() | Self::DIFFERENT_PLATFORM_TYPE.bits();
        const SAME_ENTITY_LOGIN_PROVIDER = 1 << 2;
        const DIFFERENT_ENTITY_LOGIN_PROVIDER = 1 << 3;
        const ANY_ENTITY_LOGIN_PROVIDER = Self::SAME_ENTITY_LOGIN_PROVIDER.bits() | Self::DIFFERENT_ENTITY_LOGIN_PROVIDER.bits();
    }
}

impl DirectPeerConnectivity {
    /// Parses one configuration option name. `None` maps to the empty set.
    pub fn from_option_name(name: &str) -> Option<Self> {
        let flags = match name {
            "None" => Self::empty(),
            "SamePlatformType" => Self::SAME_PLATFORM_TYPE,
            "DifferentPlatformType" => Self::DIFFERENT_PLATFORM_TYPE,
            "AnyPlatformType" => Self::ANY_PLATFORM_TYPE,
            "SameEntityLoginProvider" => Self::SAME_ENTITY_LOGIN_PROVIDER,
            "DifferentEntityLoginProvider" => Self::DIFFERENT_ENTITY_LOGIN_PROVIDER,
            "AnyEntityLoginProvider" => Self::ANY_ENTITY_LOGIN_PROVIDER,
            _ => return None,
        };
        Some(flags)
    }
}

impl Default for DirectPeerConnectivity {
    fn default() -> Self {
        Self::ANY_PLATFORM_TYPE | Self::ANY_ENTITY_LOGIN_PROVIDER
    }
}

/// Shape of a network requested at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfiguration {
    pub max_user_count: u32,
    pub max_device_count: u32,
    pub max_users_per_device: u32,
    pub max_devices_per_user: u32,
    pub max_endpoints_per_device: u32,
    pub direct_peer_connectivity: DirectPeerConnectivity,
}

impl Default for NetworkConfiguration {
    fn default() -> Self {
        Self {
            max_user_count: limits::DEFAULT_MAX_USER_COUNT,
            max_device_count: limits::DEFAULT_MAX_DEVICE_COUNT,
            max_users_per_device: limits::DEFAULT_MAX_USERS_PER_DEVICE,
            max_devices_per_user: limits::DEFAULT_MAX_DEVICES_PER_USER,
            max_endpoints_per_device: limits::DEFAULT_MAX_ENDPOINTS_PER_DEVICE,
            direct_peer_connectivity: DirectPeerConnectivity::default(),
        }
    }
}

/// Who may revoke an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvitationRevocability {
    Creator,
    Anyone,
}

/// Invitation attached to a new network; users must present its identifier to authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationConfiguration {
    pub identifier: String,
    pub revocability: InvitationRevocability,
    /// Entities allowed to use the invitation. Empty means anyone.
    pub entity_ids: Vec<EntityKey>,
}

/// Why the service tore a network down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum NetworkDestroyedReason {
    Requested,
    Disconnected,
    Kicked,
    DeviceLostAuthentication,
    CreationFailed,
}

/// Delivery class used for every virtual socket send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub reliable: bool,
    pub sequential: bool,
    pub max_priority: bool,
    pub timeout: Duration,
}

impl SendOptions {
    /// The single class used by the virtual socket transport.
    pub const fn socket_default() -> Self {
        Self {
            reliable: true,
            sequential: true,
            max_priority: true,
            timeout: limits::SEND_TIMEOUT,
        }
    }
}

/// What the service knows about an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointInfo {
    pub id: EndpointId,
    pub device: crate::ids::DeviceId,
    pub is_local: bool,
}

// ============================================================================
// Lobbies
// ============================================================================

/// Who can find and join a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, IntoStaticStr)]
pub enum AccessPolicy {
    #[default]
    Private,
    Friends,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OwnerMigrationPolicy {
    #[default]
    Automatic,
    Manual,
    None,
    Server,
}

/// Property list. A `None` value deletes the key.
pub type PropertyList = Vec<(String, Option<String>)>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LobbyCreateConfig {
    pub max_member_count: u32,
    pub owner_migration: OwnerMigrationPolicy,
    pub access_policy: AccessPolicy,
    pub search_properties: PropertyList,
    pub lobby_properties: PropertyList,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LobbyJoinConfig {
    pub member_properties: PropertyList,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LobbyArrangedJoinConfig {
    pub max_member_count: u32,
    pub owner_migration: OwnerMigrationPolicy,
    pub access_policy: AccessPolicy,
    pub member_properties: PropertyList,
}

/// One posted update. Lobby and search properties are only accepted from the owner.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LobbyDataUpdate {
    pub new_owner: Option<EntityKey>,
    pub access_policy: Option<AccessPolicy>,
    pub lobby_properties: PropertyList,
    pub search_properties: PropertyList,
    pub member_properties: PropertyList,
}

impl LobbyDataUpdate {
    pub fn is_empty(&self) -> bool {
        self.new_owner.is_none()
            && self.access_policy.is_none()
            && self.lobby_properties.is_empty()
            && self.search_properties.is_empty()
            && self.member_properties.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LobbySearchConfig {
    pub filter: String,
    pub sort: Option<String>,
    pub max_results: u32,
}

/// One lobby returned by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbySearchResult {
    pub lobby_id: LobbyId,
    pub connection_string: Option<String>,
    pub owner: Option<EntityKey>,
    pub max_member_count: u32,
    pub current_member_count: u32,
    pub search_properties: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum LobbyDisconnectingReason {
    NoLocalMembers,
    LobbyDeleted,
    ConnectionInterruption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum InviteListenerStatus {
    NotListening,
    Listening,
    NotAuthorized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum MemberRemovedReason {
    LocalUserLeft,
    RemoteUserLeft,
    Kicked,
}

// ============================================================================
// Matchmaking
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketConfiguration {
    pub timeout_secs: u32,
    pub queue_name: String,
}

/// Service-side ticket status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr, EnumString)]
pub enum TicketStatus {
    Creating,
    Joining,
    WaitingForPlayers,
    WaitingForMatch,
    Matched,
    Canceled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchMember {
    pub entity: EntityKey,
    pub attributes: String,
}

/// Result payload of a matched ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchDetails {
    pub match_id: String,
    pub members: Vec<MatchMember>,
    pub regions: Vec<String>,
    pub lobby_arrangement_string: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_names_parse() {
        assert_eq!(
            DirectPeerConnectivity::from_option_name("None"),
            Some(DirectPeerConnectivity::empty())
        );
        assert_eq!(
            DirectPeerConnectivity::from_option_name("AnyPlatformType"),
            Some(
                DirectPeerConnectivity::SAME_PLATFORM_TYPE
                    | DirectPeerConnectivity::DIFFERENT_PLATFORM_TYPE
            )
        );
        assert_eq!(DirectPeerConnectivity::from_option_name("Bogus"), None);
    }

    #[test]
    fn empty_update_detected() {
        assert!(LobbyDataUpdate::default().is_empty());
        let update = LobbyDataUpdate {
            member_properties: vec![("k".into(), Some("v".into()))],
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
