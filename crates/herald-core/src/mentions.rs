//! Fixed-grammar mention-token extraction.
//!
//! Discord encodes inline references as `<@&ID>` for roles and `<@ID>` or
//! `<@!ID>` for users. Command arguments arrive as plain strings, so the ids
//! have to be scanned back out. Malformed tokens are ignored, never an error.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{RoleId, UserId};

fn role_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<@&(\d+)>").expect("valid regex"))
}

fn user_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<@!?(\d+)>").expect("valid regex"))
}

/// All role ids mentioned in `text`, in order of first appearance.
/// Duplicates are kept.
pub fn role_ids(text: &str) -> Vec<RoleId> {
    role_re()
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<u64>().ok())
        .map(RoleId)
        .collect()
}

/// All user ids mentioned in `text`, in order of first appearance.
/// Role tokens (`<@&ID>`) are not user mentions and are skipped.
pub fn user_ids(text: &str) -> Vec<UserId> {
    user_re()
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<u64>().ok())
        .map(UserId)
        .collect()
}

/// Render a role mention token.
pub fn role_mention(role: RoleId) -> String {
    format!("<@&{}>", role.0)
}
