use lobbynet_proto::constants::{SEARCH_KEY_PLATFORM_ID, SETTING_CONNECTION_STRING};
use lobbynet_proto::types::LobbySearchResult;
use tracing::debug;

use super::properties::owner_from_search;
use super::search_keys::{parse_slot_value, slot_for_key};
use crate::settings::{Advertisement, SearchResult, SessionFlags, SessionSettings, SettingValue};

/// Converts one service result. Lobbies without a connection string cannot be joined and are
/// dropped.
pub fn convert(result: &LobbySearchResult) -> Option<SearchResult> {
    let Some(connection_string) = result
        .connection_string
        .as_ref()
        .filter(|c| !c.is_empty())
    else {
        debug!(lobby = %result.lobby_id, "search result without connection string dropped");
        return None;
    };

    let mut settings = SessionSettings::new(result.max_member_count);
    settings.flags.set(SessionFlags::ALLOW_JOIN_IN_PROGRESS, true);
    settings.set(
        SETTING_CONNECTION_STRING,
        connection_string.clone(),
        Advertisement::ViaOnlineService,
    );

    for (key, value) in &result.search_properties {
        if key == SEARCH_KEY_PLATFORM_ID {
            continue;
        }
        match slot_for_key(key) {
            Some(slot) => settings.set(
                slot.setting,
                parse_slot_value(slot.kind, value),
                Advertisement::ViaOnlineService,
            ),
            None => settings.set(
                key.clone(),
                SettingValue::Str(value.clone()),
                Advertisement::ViaOnlineService,
            ),
        }
    }

    Some(SearchResult {
        lobby_id: result.lobby_id,
        connection_string: connection_string.clone(),
        owner: owner_from_search(&result.search_properties),
        settings,
        open_public_connections: result
            .max_member_count
            .saturating_sub(result.current_member_count),
    })
}
