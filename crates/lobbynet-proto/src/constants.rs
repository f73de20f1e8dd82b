/// Text prefix of every virtual socket address, e.g. `lobbynet.17:17`.
pub const ADDRESS_PREFIX: &str = "lobbynet.";

/// Name of the virtual socket subsystem as seen by a generic networking layer.
pub const SOCKET_SUBSYSTEM_NAME: &str = "LOBBYNET";

/// Entity type used for player identities.
pub const ENTITY_TYPE_TITLE_PLAYER: &str = "title_player_account";

/// Queue used when the search settings don't name one.
pub const DEFAULT_MATCHMAKING_QUEUE: &str = "Default";

// ============================================================================
// Session setting names
// ============================================================================

/// Backend network id written into the session settings by the host.
pub const SETTING_NETWORK_ID: &str = "NETWORKID";

/// Serialized [`crate::NetworkDescriptor`] written by the host.
pub const SETTING_NETWORK_DESCRIPTOR: &str = "NETWORKDESCRIPTOR";

/// Host's virtual socket address text.
pub const SETTING_HOST_CONNECT_INFO: &str = "HOSTCONNECTINFO";

/// Lobby connection string carried in search results.
pub const SETTING_CONNECTION_STRING: &str = "CONNECTIONSTRING";

/// Matchmaking queue name (search settings).
pub const SETTING_MATCH_QUEUE_NAME: &str = "MATCHMAKINGQUEUE";

/// Matchmaking attributes json (search settings, or session settings as a fallback).
pub const SETTING_MATCH_ATTRIBUTES: &str = "USERATTRIBUTES";

// ============================================================================
// Lobby property names
// ============================================================================

/// Member property holding the member's platform id.
pub const MEMBER_PLATFORM_ID: &str = "PlatformId";

/// Member property holding the member's platform model.
pub const MEMBER_PLATFORM_MODEL: &str = "PlatformModel";

/// Member property holding the member's matchmaking attributes after an arranged join.
pub const MEMBER_MATCH_ATTRIBUTES: &str = "CustomMatchJsonProperties";

/// Lobby property packing every boolean session flag.
pub const LOBBY_FLAGS_PROPERTY: &str = "_flags";

// ============================================================================
// Search keys
// ============================================================================

pub const SEARCH_KEY_PREFIX_STRING: &str = "string_";
pub const SEARCH_KEY_PREFIX_NUMBER: &str = "number_";

/// Search slot reserved for the owner's platform id.
pub const SEARCH_KEY_PLATFORM_ID: &str = "string_key1";

/// Built-in search key: current member count.
pub const SEARCH_KEY_MEMBER_COUNT: &str = "lobby/memberCount";

/// Built-in search key: whether the searching user is a member.
pub const SEARCH_KEY_AM_MEMBER: &str = "lobby/amMember";

/// Reserved filter used by friend searches.
pub const FRIENDS_FILTER: &str = "lobby/friends";
