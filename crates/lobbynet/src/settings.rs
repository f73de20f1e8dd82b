//! Session settings, searches and search results.

use std::collections::BTreeMap;
use std::fmt;

use bitflags::bitflags;
use lobbynet_proto::LobbyId;
use strum::IntoStaticStr;

use crate::identity::UserId;

/// A typed setting value.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl SettingValue {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// True for an empty string; other kinds always carry a value.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Str(s) if s.is_empty())
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for SettingValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Where a setting is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Advertisement {
    #[default]
    DontAdvertise,
    ViaPingOnly,
    ViaOnlineService,
    ViaOnlineServiceAndPing,
}

impl Advertisement {
    /// Published through the lobby service.
    pub fn is_online(self) -> bool {
        self >= Self::ViaOnlineService
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSetting {
    pub value: SettingValue,
    pub advertisement: Advertisement,
}

bitflags! {
    /// Boolean session options, packed into the `_flags` lobby property.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SessionFlags: u32 {
        const SHOULD_ADVERTISE = 1 << 0;
        const ALLOW_JOIN_IN_PROGRESS = 1 << 1;
        const IS_LAN = 1 << 2;
        const IS_DEDICATED = 1 << 3;
        const USES_STATS = 1 << 4;
        const ALLOW_INVITES = 1 << 5;
        const USES_PRESENCE = 1 << 6;
        const ALLOW_JOIN_VIA_PRESENCE = 1 << 7;
        const ALLOW_JOIN_VIA_PRESENCE_FRIENDS_ONLY = 1 << 8;
        const ANTI_CHEAT_PROTECTED = 1 << 9;
    }
}

impl SessionFlags {
    pub fn to_property(self) -> String {
        self.bits().to_string()
    }

    pub fn from_property(text: &str) -> Option<Self> {
        text.trim().parse::<u32>().ok().map(Self::from_bits_truncate)
    }
}

/// Settings bag of a named session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSettings {
    pub num_public_connections: u32,
    pub num_private_connections: u32,
    pub flags: SessionFlags,
    pub settings: BTreeMap<String, SessionSetting>,
    /// Per-member settings keyed by platform user id.
    pub member_settings: BTreeMap<UserId, BTreeMap<String, SessionSetting>>,
}

impl SessionSettings {
    pub fn new(num_public_connections: u32) -> Self {
        Self {
            num_public_connections,
            ..Self::default()
        }
    }

    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<SettingValue>,
        advertisement: Advertisement,
    ) {
        self.settings.insert(
            name.into(),
            SessionSetting {
                value: value.into(),
                advertisement,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&SessionSetting> {
        self.settings.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.settings.get(name).and_then(|s| s.value.as_str())
    }

    /// String setting that is present and not empty.
    pub fn non_empty_str(&self, name: &str) -> Option<&str> {
        self.get_str(name).filter(|s| !s.is_empty())
    }

    pub fn remove(&mut self, name: &str) -> Option<SessionSetting> {
        self.settings.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.settings.contains_key(name)
    }

    pub fn set_member(
        &mut self,
        user: &UserId,
        name: impl Into<String>,
        value: impl Into<SettingValue>,
        advertisement: Advertisement,
    ) {
        self.member_settings.entry(user.clone()).or_default().insert(
            name.into(),
            SessionSetting {
                value: value.into(),
                advertisement,
            },
        );
    }

    pub fn member(&self, user: &UserId) -> Option<&BTreeMap<String, SessionSetting>> {
        self.member_settings.get(user)
    }
}

/// Comparison applied to one search parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoStaticStr)]
pub enum ComparisonOp {
    #[default]
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanEquals,
    LessThan,
    LessThanEquals,
    Near,
    In,
    NotIn,
}

impl ComparisonOp {
    /// Operator token of the lobby filter grammar, if this comparison has one.
    pub fn filter_token(self) -> Option<&'static str> {
        match self {
            Self::Equals => Some("eq"),
            Self::NotEquals => Some("ne"),
            Self::GreaterThan => Some("gt"),
            Self::GreaterThanEquals => Some("ge"),
            Self::LessThan => Some("lt"),
            Self::LessThanEquals => Some("le"),
            Self::Near | Self::In | Self::NotIn => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchParam {
    pub value: SettingValue,
    pub op: ComparisonOp,
}

/// Parameters of a session search or a matchmaking request.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSearch {
    pub query: BTreeMap<String, SearchParam>,
    pub max_results: u32,
    /// Ticket timeout in seconds. Negative means as long as the service allows.
    pub timeout_secs: i32,
}

impl Default for SessionSearch {
    fn default() -> Self {
        Self {
            query: BTreeMap::new(),
            max_results: 50,
            timeout_secs: 120,
        }
    }
}

impl SessionSearch {
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<SettingValue>, op: ComparisonOp) {
        self.query.insert(
            name.into(),
            SearchParam {
                value: value.into(),
                op,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.query.get(name).map(|p| &p.value)
    }
}

/// Progress of the lobby search in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoStaticStr)]
pub enum SearchState {
    #[default]
    NotStarted,
    InProgress,
    Done,
    Failed,
}

/// One joinable session found by a search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub lobby_id: LobbyId,
    pub connection_string: String,
    pub owner: Option<UserId>,
    pub settings: SessionSettings,
    pub open_public_connections: u32,
}

/// Outcome of joining a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum JoinResult {
    Success,
    AlreadyInSession,
    SessionIsFull,
    SessionDoesNotExist,
    CouldNotRetrieveAddress,
    UnknownError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_property_roundtrip_ignores_unknown_bits() {
        let flags = SessionFlags::SHOULD_ADVERTISE | SessionFlags::ALLOW_INVITES;
        assert_eq!(flags.to_property(), "33");
        assert_eq!(SessionFlags::from_property("33"), Some(flags));
        assert_eq!(
            SessionFlags::from_property("65537"),
            Some(SessionFlags::SHOULD_ADVERTISE)
        );
        assert_eq!(SessionFlags::from_property("yes"), None);
    }

    #[test]
    fn advertisement_ordering() {
        assert!(!Advertisement::ViaPingOnly.is_online());
        assert!(Advertisement::ViaOnlineService.is_online());
        assert!(Advertisement::ViaOnlineServiceAndPing.is_online());
    }

    #[test]
    fn non_empty_str_skips_blank() {
        let mut settings = SessionSettings::new(4);
        settings.set("MAPNAME", "", Advertisement::ViaOnlineService);
        settings.set("GAMEMODE", "ctf", Advertisement::ViaOnlineService);
        assert_eq!(settings.non_empty_str("MAPNAME"), None);
        assert_eq!(settings.non_empty_str("GAMEMODE"), Some("ctf"));
    }
}
