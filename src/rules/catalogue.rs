use super::EntityRule;

/// Logical name of the table the identity pairs are read from.
pub const MAPPING_TABLE: &str = "ldap_user_mapping";

/// Storage ids of home storages are `home::<user>`.
pub const HOME_STORAGE_PREFIX: &str = "home::";

/// Every governed entity, in execution order.
///
/// The mapping-store record goes last: if a run dies mid-pair, the mapping
/// row still holds the old name and the pair is offered again on the next
/// run, which then completes the remaining tables.
pub fn standard_rules() -> Vec<EntityRule> {
    vec![
        EntityRule::new("account", "accounts")
            .exact("user_id")
            .lowercase("lower_user_id"),
        EntityRule::new("activity", "activity")
            .exact("user")
            .exact("affecteduser")
            .encoded("subjectparams")
            .per_row("activity_id"),
        EntityRule::new("auth_session", "authtoken").exact("uid"),
        EntityRule::new("comment", "comments").exact("actor_id"),
        EntityRule::new("comment_read_marker", "comments_read_markers").exact("user_id"),
        EntityRule::new("mount", "mounts")
            .exact("user_id")
            .path_segment("mount_point")
            .per_row("id"),
        EntityRule::new("preference", "preferences").exact("userid"),
        EntityRule::new("share", "share")
            .exact("share_with")
            .exact("uid_owner")
            .exact("uid_initiator")
            .per_row("id"),
        EntityRule::new("storage", "storages").composite("id", HOME_STORAGE_PREFIX),
        EntityRule::new("tag_ownership", "vcategory").exact("uid"),
        EntityRule::new("user_mapping", MAPPING_TABLE).exact("owncloud_name"),
    ]
}
