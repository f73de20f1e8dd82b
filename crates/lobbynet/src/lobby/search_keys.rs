//! Mapping from well-known session setting names onto the lobby service's fixed search slots.
//!
//! The service indexes a limited set of keys: `string_key1..30` and `number_key1..30`.
//! Well-known settings get a fixed slot so that searches from any client agree on where to look.
//! Slot `string_key1` carries the owner's platform id.

use lobbynet_proto::constants::{
    SEARCH_KEY_AM_MEMBER, SEARCH_KEY_MEMBER_COUNT, SEARCH_KEY_PREFIX_NUMBER,
    SEARCH_KEY_PREFIX_STRING,
};

use crate::settings::SettingValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Str,
    Int,
    Bool,
}

const STRING_SLOTS: &[(&str, u8)] = &[
    ("MAPNAME", 30),
    ("GAMEMODE", 29),
    ("REGION", 28),
    ("SUBREGION", 27),
    ("DCID", 26),
    ("ALLOWBROADCASTING", 25),
    ("SESSIONKEY", 24),
    ("CUSTOM", 23),
    ("MATCHHOPPER", 22),
    ("MATCHATTRIBUTES", 21),
    ("MATCHMEMBERSJSON", 20),
    ("SESSIONMEMBERCONSTANTCUSTOMJSONXUIDPREFIX", 19),
    ("SESSIONTEMPLATENAME", 18),
    ("GAMESESSIONURI", 17),
    ("GROUPNAMEPREFIX", 16),
    ("CUSTOMJOININFO", 15),
    ("SESSIONSUBSCRIPTIONTYPES", 14),
    ("HOSTMIGRATION", 13),
    ("DEDICATEDONLY", 12),
    ("EXCLUDEUNIQUEIDS", 11),
    ("SEARCHUSER", 10),
    ("SEARCHKEYWORDS", 9),
    ("MATCHMAKINGQUEUE", 8),
    ("SWITCHSELECTIONMETHOD", 7),
    ("TEAM", 6),
];

const INT_SLOTS: &[(&str, u8)] = &[
    ("NUMBOTS", 30),
    ("BEACONPORT", 29),
    ("QOS", 28),
    ("NEEDS", 27),
    ("NEEDSSORT", 26),
    ("MAXSPECTATORS", 25),
    ("MATCHTIMEOUT", 24),
    ("MAXRESULT", 23),
    ("CONTRACTVERSIONFILTER", 22),
    ("FINDPRIVATESESSIONS", 21),
    ("FINDRESERVEDSESSIONS", 20),
    ("FINDINACTIVESESSIONS", 19),
    ("MULTIPLAYERVISIBILITY", 18),
    ("CHANGENUMBER", 17),
    ("ALLOWARBITERMIGRATION", 16),
    ("MATCHINGPRESERVESESSION", 15),
    ("MINSLOTSAVAILABLE", 14),
];

const BOOL_SLOTS: &[(&str, u8)] = &[
    ("BROADCASTER", 13),
    ("PARTYMEMBERSPECTATOR", 12),
    ("PARTYENABLEDSESSION", 11),
    ("EMPTYONLY", 10),
    ("NONEMPTYONLY", 9),
    ("SECUREONLY", 8),
    ("PRESENCESEARCH", 7),
    ("LOBBYSEARCH", 6),
];

/// A well-known setting's slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSlot {
    pub setting: &'static str,
    pub key: String,
    pub kind: SlotKind,
}

fn slot_key(kind: SlotKind, index: u8) -> String {
    match kind {
        SlotKind::Str => format!("{SEARCH_KEY_PREFIX_STRING}key{index}"),
        SlotKind::Int | SlotKind::Bool => format!("{SEARCH_KEY_PREFIX_NUMBER}key{index}"),
    }
}

fn tables() -> [(SlotKind, &'static [(&'static str, u8)]); 3] {
    [
        (SlotKind::Str, STRING_SLOTS),
        (SlotKind::Int, INT_SLOTS),
        (SlotKind::Bool, BOOL_SLOTS),
    ]
}

/// Slot of a well-known setting name. Case-insensitive.
pub fn slot_for_setting(name: &str) -> Option<SearchSlot> {
    tables().into_iter().find_map(|(kind, table)| {
        table
            .iter()
            .find(|(setting, _)| setting.eq_ignore_ascii_case(name))
            .map(|&(setting, index)| SearchSlot {
                setting,
                key: slot_key(kind, index),
                kind,
            })
    })
}

/// Reverse lookup: the well-known setting stored under a search key.
pub fn slot_for_key(key: &str) -> Option<SearchSlot> {
    let (numeric, index) = if let Some(rest) = key.strip_prefix(SEARCH_KEY_PREFIX_STRING) {
        (false, rest.strip_prefix("key")?)
    } else if let Some(rest) = key.strip_prefix(SEARCH_KEY_PREFIX_NUMBER) {
        (true, rest.strip_prefix("key")?)
    } else {
        return None;
    };
    let index: u8 = index.parse().ok()?;

    tables()
        .into_iter()
        .filter(|(kind, _)| (*kind != SlotKind::Str) == numeric)
        .find_map(|(kind, table)| {
            table
                .iter()
                .find(|(_, i)| *i == index)
                .map(|&(setting, _)| SearchSlot {
                    setting,
                    key: key.to_string(),
                    kind,
                })
        })
}

/// Names the service indexes as they are: built-in keys and anything already slot-prefixed.
pub fn is_search_key(name: &str) -> bool {
    name == SEARCH_KEY_MEMBER_COUNT
        || name == SEARCH_KEY_AM_MEMBER
        || name.starts_with(SEARCH_KEY_PREFIX_STRING)
        || name.starts_with(SEARCH_KEY_PREFIX_NUMBER)
}

/// Text stored in a slot. Booleans become `1`/`0`.
pub fn slot_value(kind: SlotKind, value: &SettingValue) -> String {
    match (kind, value) {
        (SlotKind::Bool, SettingValue::Bool(b)) => String::from(if *b { "1" } else { "0" }),
        (_, value) => value.to_string(),
    }
}

/// Typed value read back from a slot.
pub fn parse_slot_value(kind: SlotKind, text: &str) -> SettingValue {
    match kind {
        SlotKind::Str => SettingValue::Str(text.to_string()),
        SlotKind::Int => text
            .parse::<i64>()
            .map(SettingValue::Int)
            .unwrap_or_else(|_| SettingValue::Str(text.to_string())),
        SlotKind::Bool => SettingValue::Bool(text == "1" || text.eq_ignore_ascii_case("true")),
    }
}
