//! Store key layout
//!
//! Composite keys always separate their ids with `|`, so `(1, 23)` and
//! `(12, 3)` can never address the same record.

/// Pattern matching every guild record
pub const GUILD_PATTERN: &str = "guild||*";
/// Pattern matching every member record
pub const MEMBER_PATTERN: &str = "member||*";

#[must_use]
pub fn guild_key(guild_id: u64) -> String {
    format!("guild||{guild_id}")
}

#[must_use]
pub fn member_key(guild_id: u64, user_id: u64) -> String {
    format!("member||{guild_id}|{user_id}")
}

#[must_use]
pub fn action_key(guild_id: u64, action_id: u64) -> String {
    format!("action||{guild_id}|{action_id}")
}

/// Key of the per-guild action id counter
#[must_use]
pub fn action_counter_key(guild_id: u64) -> String {
    format!("action_counter||{guild_id}")
}

/// Pattern matching every audit record of one guild
#[must_use]
pub fn guild_action_pattern(guild_id: u64) -> String {
    format!("action||{guild_id}|*")
}

/// Scheduler job id for a member
#[must_use]
pub fn job_id(guild_id: u64, user_id: u64) -> String {
    format!("{guild_id}|{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_keys_do_not_collide() {
        assert_ne!(member_key(1, 23), member_key(12, 3));
        assert_eq!(member_key(1, 23), "member||1|23");
    }

    #[test]
    fn test_job_id_format() {
        assert_eq!(job_id(10, 20), "10|20");
    }

    #[test]
    fn test_guild_action_pattern_scopes_to_guild() {
        let pattern = glob::Pattern::new(&guild_action_pattern(1)).unwrap();
        assert!(pattern.matches(&action_key(1, 7)));
        assert!(!pattern.matches(&action_key(12, 7)));
    }
}
