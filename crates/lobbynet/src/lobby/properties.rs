//! Translation between session settings and the three lobby property namespaces.

use std::collections::BTreeMap;

use lobbynet_proto::constants::{
    LOBBY_FLAGS_PROPERTY, MEMBER_MATCH_ATTRIBUTES, MEMBER_PLATFORM_ID, MEMBER_PLATFORM_MODEL,
    SEARCH_KEY_PLATFORM_ID,
};
use lobbynet_proto::types::{
    AccessPolicy, LobbyArrangedJoinConfig, LobbyCreateConfig, LobbyJoinConfig, MatchDetails,
    OwnerMigrationPolicy, PropertyList,
};
use tracing::warn;

use super::search_keys::{
    is_search_key, parse_slot_value, slot_for_key, slot_for_setting, slot_value,
};
use crate::identity::{LocalUser, UserId};
use crate::settings::{Advertisement, SessionFlags, SessionSetting, SessionSettings, SettingValue};

pub fn access_policy(flags: SessionFlags) -> AccessPolicy {
    if !flags.contains(SessionFlags::SHOULD_ADVERTISE) {
        AccessPolicy::Private
    } else if flags.contains(SessionFlags::ALLOW_JOIN_VIA_PRESENCE_FRIENDS_ONLY) {
        AccessPolicy::Friends
    } else {
        AccessPolicy::Public
    }
}

/// Platform id and model, present on every member we add.
pub fn base_member_properties(user: &UserId, platform_model: &str) -> PropertyList {
    vec![
        (MEMBER_PLATFORM_ID.to_string(), Some(user.to_string())),
        (MEMBER_PLATFORM_MODEL.to_string(), Some(platform_model.to_string())),
    ]
}

/// Lobby-wide properties: every online-advertised setting plus the packed flags.
pub fn lobby_properties(settings: &SessionSettings) -> PropertyList {
    let mut props: PropertyList = settings
        .settings
        .iter()
        .filter(|(_, s)| s.advertisement.is_online())
        .map(|(name, s)| {
            if s.value.is_empty() {
                warn!(setting = %name, "empty lobby property value, clearing it");
                (name.clone(), None)
            } else {
                (name.clone(), Some(s.value.to_string()))
            }
        })
        .collect();
    props.push((
        LOBBY_FLAGS_PROPERTY.to_string(),
        Some(settings.flags.to_property()),
    ));
    props
}

/// Search-indexed properties: built-in/prefixed keys as they are, well-known settings in their
/// fixed slot, and the owner's platform id in `string_key1` when given.
pub fn search_properties(settings: &SessionSettings, owner: Option<&UserId>) -> PropertyList {
    let mut props = PropertyList::new();
    for (name, setting) in &settings.settings {
        if is_search_key(name) {
            let value = (!setting.value.is_empty()).then(|| setting.value.to_string());
            props.push((name.clone(), value));
        } else if let Some(slot) = slot_for_setting(name) {
            props.push((slot.key, Some(slot_value(slot.kind, &setting.value))));
        }
    }
    if let Some(owner) = owner {
        props.push((SEARCH_KEY_PLATFORM_ID.to_string(), Some(owner.to_string())));
    }
    props
}

pub fn create_config(settings: &SessionSettings, owner: &UserId) -> LobbyCreateConfig {
    LobbyCreateConfig {
        max_member_count: settings.num_public_connections,
        owner_migration: OwnerMigrationPolicy::Automatic,
        access_policy: access_policy(settings.flags),
        search_properties: search_properties(settings, Some(owner)),
        lobby_properties: lobby_properties(settings),
    }
}

/// Member properties for a regular join: the base pair plus advertised, non-empty settings.
pub fn join_config(settings: &SessionSettings, user: &UserId, platform_model: &str) -> LobbyJoinConfig {
    let mut member_properties = base_member_properties(user, platform_model);
    member_properties.extend(
        settings
            .settings
            .iter()
            .filter(|(_, s)| s.advertisement.is_online() && !s.value.is_empty())
            .map(|(name, s)| (name.clone(), Some(s.value.to_string()))),
    );
    LobbyJoinConfig { member_properties }
}

pub fn arranged_config(
    details: &MatchDetails,
    host: &LocalUser,
    searching_player: &UserId,
    platform_model: &str,
) -> LobbyArrangedJoinConfig {
    let mut member_properties = base_member_properties(searching_player, platform_model);
    match details
        .members
        .iter()
        .find(|m| m.entity.id == host.entity.id)
    {
        Some(member) => member_properties.push((
            MEMBER_MATCH_ATTRIBUTES.to_string(),
            Some(member.attributes.clone()),
        )),
        None => warn!(user = %host.user_id, "local user missing from match members"),
    }
    LobbyArrangedJoinConfig {
        max_member_count: details.members.len() as u32,
        owner_migration: OwnerMigrationPolicy::Automatic,
        access_policy: AccessPolicy::Private,
        member_properties,
    }
}

/// Member properties in `wanted` that differ from what the service currently holds.
pub fn member_changes(
    wanted: Option<&BTreeMap<String, SessionSetting>>,
    current: &[(String, String)],
) -> PropertyList {
    let Some(wanted) = wanted else {
        return PropertyList::new();
    };
    wanted
        .iter()
        .filter_map(|(name, setting)| {
            let value = setting.value.to_string();
            let unchanged = current.iter().any(|(k, v)| k == name && *v == value);
            (!unchanged).then(|| (name.clone(), (!value.is_empty()).then_some(value)))
        })
        .collect()
}

/// Applies changed lobby keys. A key missing from `props` was deleted.
pub fn apply_lobby_keys(settings: &mut SessionSettings, keys: &[String], props: &[(String, String)]) {
    for key in keys {
        match props.iter().find(|(k, _)| k == key).map(|(_, v)| v) {
            Some(value) if key == LOBBY_FLAGS_PROPERTY => match SessionFlags::from_property(value) {
                Some(flags) => settings.flags = flags,
                None => warn!(value = %value, "unparseable lobby flags"),
            },
            Some(value) => settings.set(key.clone(), value.clone(), Advertisement::ViaOnlineService),
            None => {
                settings.remove(key);
            }
        }
    }
}

/// Applies changed search keys, mapping fixed slots back onto their setting names.
pub fn apply_search_keys(settings: &mut SessionSettings, keys: &[String], props: &[(String, String)]) {
    for key in keys {
        if key == SEARCH_KEY_PLATFORM_ID {
            continue;
        }
        let value = props.iter().find(|(k, _)| k == key).map(|(_, v)| v);
        let (name, typed) = match (slot_for_key(key), value) {
            (Some(slot), Some(v)) => (slot.setting.to_string(), Some(parse_slot_value(slot.kind, v))),
            (Some(slot), None) => (slot.setting.to_string(), None),
            (None, v) => (key.clone(), v.map(|v| SettingValue::Str(v.clone()))),
        };
        match typed {
            Some(value) => settings.set(name, value, Advertisement::ViaOnlineService),
            None => {
                settings.remove(&name);
            }
        }
    }
}

/// Merges a member's properties into the session's per-member settings.
pub fn apply_member_properties(
    settings: &mut SessionSettings,
    user: &UserId,
    props: &[(String, String)],
) {
    for (name, value) in props {
        settings.set_member(user, name.clone(), value.clone(), Advertisement::ViaOnlineService);
    }
}

/// The platform id a member advertised about itself.
pub fn platform_id(props: &[(String, String)]) -> Option<UserId> {
    props
        .iter()
        .find(|(k, _)| k == MEMBER_PLATFORM_ID)
        .map(|(_, v)| UserId::new(v.clone()))
}

pub fn owner_from_search(props: &[(String, String)]) -> Option<UserId> {
    props
        .iter()
        .find(|(k, _)| k == SEARCH_KEY_PLATFORM_ID)
        .filter(|(_, v)| !v.is_empty())
        .map(|(_, v)| UserId::new(v.clone()))
}

#[cfg(test)]
mod tests {
    use lobbynet_proto::EntityKey;
    use lobbynet_proto::types::MatchMember;

    use super::*;

    fn props(list: &PropertyList, key: &str) -> Option<Option<String>> {
        list.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    fn sample_settings() -> SessionSettings {
        let mut settings = SessionSettings::new(4);
        settings.flags = SessionFlags::SHOULD_ADVERTISE | SessionFlags::ALLOW_JOIN_IN_PROGRESS;
        settings.set("MAPNAME", "Harbor", Advertisement::ViaOnlineService);
        settings.set("SECUREONLY", true, Advertisement::DontAdvertise);
        settings.set("MOTD", "", Advertisement::ViaOnlineService);
        settings.set("number_key3", 9, Advertisement::DontAdvertise);
        settings.set("PRIVATE", "x", Advertisement::DontAdvertise);
        settings
    }

    #[test]
    fn access_policy_from_flags() {
        assert_eq!(access_policy(SessionFlags::empty()), AccessPolicy::Private);
        assert_eq!(
            access_policy(SessionFlags::SHOULD_ADVERTISE),
            AccessPolicy::Public
        );
        assert_eq!(
            access_policy(
                SessionFlags::SHOULD_ADVERTISE | SessionFlags::ALLOW_JOIN_VIA_PRESENCE_FRIENDS_ONLY
            ),
            AccessPolicy::Friends
        );
    }

    #[test]
    fn create_config_classifies_settings() {
        let cfg = create_config(&sample_settings(), &UserId::new("alice"));
        assert_eq!(cfg.max_member_count, 4);
        assert_eq!(cfg.access_policy, AccessPolicy::Public);

        assert_eq!(props(&cfg.lobby_properties, "MAPNAME"), Some(Some("Harbor".into())));
        assert_eq!(props(&cfg.lobby_properties, "MOTD"), Some(None));
        assert_eq!(props(&cfg.lobby_properties, "PRIVATE"), None);
        assert_eq!(props(&cfg.lobby_properties, "_flags"), Some(Some("3".into())));

        assert_eq!(props(&cfg.search_properties, "string_key30"), Some(Some("Harbor".into())));
        assert_eq!(props(&cfg.search_properties, "number_key8"), Some(Some("1".into())));
        assert_eq!(props(&cfg.search_properties, "number_key3"), Some(Some("9".into())));
        assert_eq!(props(&cfg.search_properties, "string_key1"), Some(Some("alice".into())));
        assert_eq!(props(&cfg.search_properties, "PRIVATE"), None);
    }

    #[test]
    fn join_config_skips_empty_and_unadvertised() {
        let cfg = join_config(&sample_settings(), &UserId::new("bob"), "Rust");
        let names: Vec<&str> = cfg.member_properties.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["PlatformId", "PlatformModel", "MAPNAME"]);
    }

    #[test]
    fn arranged_config_carries_match_attributes() {
        let host = LocalUser {
            user_id: UserId::new("alice"),
            entity: EntityKey::title_player("E1"),
        };
        let details = MatchDetails {
            match_id: "m1".into(),
            members: vec![
                MatchMember {
                    entity: EntityKey::title_player("E2"),
                    attributes: "{\"skill\":3}".into(),
                },
                MatchMember {
                    entity: EntityKey::title_player("E1"),
                    attributes: "{\"skill\":5}".into(),
                },
            ],
            regions: vec![],
            lobby_arrangement_string: "arr".into(),
        };
        let cfg = arranged_config(&details, &host, &UserId::new("alice"), "Rust");
        assert_eq!(cfg.max_member_count, 2);
        assert_eq!(cfg.access_policy, AccessPolicy::Private);
        assert_eq!(
            props(&cfg.member_properties, "CustomMatchJsonProperties"),
            Some(Some("{\"skill\":5}".into()))
        );
    }

    #[test]
    fn updated_keys_are_applied_and_removed() {
        let mut settings = SessionSettings::new(4);
        settings.set("OLD", "gone", Advertisement::ViaOnlineService);
        let lobby = vec![
            ("_flags".to_string(), "33".to_string()),
            ("MAPNAME".to_string(), "Dunes".to_string()),
        ];
        apply_lobby_keys(
            &mut settings,
            &["_flags".into(), "MAPNAME".into(), "OLD".into()],
            &lobby,
        );
        assert_eq!(
            settings.flags,
            SessionFlags::SHOULD_ADVERTISE | SessionFlags::ALLOW_INVITES
        );
        assert_eq!(settings.get_str("MAPNAME"), Some("Dunes"));
        assert!(!settings.contains("OLD"));

        let search = vec![
            ("number_key30".to_string(), "4".to_string()),
            ("string_key1".to_string(), "alice".to_string()),
        ];
        apply_search_keys(
            &mut settings,
            &["number_key30".into(), "string_key1".into()],
            &search,
        );
        assert_eq!(settings.get("NUMBOTS").unwrap().value, SettingValue::Int(4));
        assert!(!settings.contains("string_key1"));
    }

    #[test]
    fn member_changes_only_reports_differences() {
        let mut settings = SessionSettings::new(2);
        let user = UserId::new("alice");
        settings.set_member(&user, "TEAM", "red", Advertisement::ViaOnlineService);
        settings.set_member(&user, "READY", true, Advertisement::ViaOnlineService);

        let current = vec![("TEAM".to_string(), "red".to_string())];
        let changes = member_changes(settings.member(&user), &current);
        assert_eq!(changes, vec![("READY".to_string(), Some("true".to_string()))]);
        assert!(member_changes(None, &current).is_empty());
    }
}
