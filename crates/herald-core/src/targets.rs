//! Broadcast target selection.
//!
//! Group-chat channels follow a naming convention: the channel name carries
//! the search marker and a `-N-` team number (e.g. `spring-12-group-chat`).
//! A role is considered aligned with a channel when the role sits in the
//! channel's permission overwrites and its name matches `team.*N` for that
//! channel's number.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{ChannelMatch, ChannelRecord};

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-(\d+)-").expect("valid regex"))
}

/// Extract the team number embedded in a channel name, if any.
pub fn channel_number(name: &str) -> Option<&str> {
    number_re()
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Select and order the broadcast target channels from a guild's channel
/// directory.
///
/// Channels whose name lacks the marker or a `-N-` number are skipped.
/// Ordering is (category name, team number), with uncategorized channels last.
pub fn match_group_channels(records: &[ChannelRecord], marker: &str) -> Vec<ChannelMatch> {
    let marker = marker.to_lowercase();

    let mut matches: Vec<(Option<String>, u64, ChannelMatch)> = Vec::new();
    for record in records {
        let name = record.channel.name.to_lowercase();
        if !name.contains(&marker) {
            continue;
        }
        let Some(number) = channel_number(&record.channel.name) else {
            tracing::debug!(channel = %record.channel.name, "matching channel has no team number, skipping");
            continue;
        };

        let role_pattern = Regex::new(&format!(r"(?i)team.*{}", regex::escape(number)))
            .expect("escaped number is a valid regex");
        let roles = record
            .overwrite_roles
            .iter()
            .filter(|role| role_pattern.is_match(&role.name))
            .cloned()
            .collect();

        let sort_number = number.parse::<u64>().unwrap_or(u64::MAX);
        matches.push((
            record.channel.category_name.clone(),
            sort_number,
            ChannelMatch {
                channel: record.channel.clone(),
                roles,
            },
        ));
    }

    matches.sort_by(|a, b| {
        (a.0.is_none(), &a.0, a.1).cmp(&(b.0.is_none(), &b.0, b.1))
    });
    matches.into_iter().map(|(_, _, m)| m).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChannelId, ChannelInfo, RoleId, RoleInfo};

    fn record(
        id: u64,
        name: &str,
        category: Option<&str>,
        roles: &[(u64, &str)],
    ) -> ChannelRecord {
        ChannelRecord {
            channel: ChannelInfo {
                id: ChannelId(id),
                name: name.to_string(),
                category_name: category.map(|s| s.to_string()),
            },
            overwrite_roles: roles
                .iter()
                .map(|(rid, rname)| RoleInfo {
                    id: RoleId(*rid),
                    name: rname.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn extracts_channel_number() {
        assert_eq!(channel_number("spring-12-group-chat"), Some("12"));
        assert_eq!(channel_number("no-number-here"), None);
    }

    #[test]
    fn filters_by_marker_and_number() {
        let records = vec![
            record(1, "spring-1-group-chat", Some("Spring"), &[]),
            record(2, "general", None, &[]),
            record(3, "group-chat-lobby", None, &[]), // marker but no number
        ];
        let matches = match_group_channels(&records, "group-chat");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].channel.id, ChannelId(1));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let records = vec![record(1, "Spring-3-Group-Chat", None, &[(9, "TEAM 3")])];
        let matches = match_group_channels(&records, "-GROUP-CHAT");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].roles.len(), 1);
    }

    #[test]
    fn aligns_roles_by_team_number() {
        let records = vec![record(
            1,
            "spring-12-group-chat",
            None,
            &[(10, "Team Alpha 12"), (11, "Team 2"), (12, "Mentors")],
        )];
        let matches = match_group_channels(&records, "group-chat");
        let roles: Vec<_> = matches[0].roles.iter().map(|r| r.id).collect();
        assert_eq!(roles, vec![RoleId(10)]);
        assert_eq!(matches[0].mention_role().unwrap().id, RoleId(10));
    }

    #[test]
    fn no_aligned_role_yields_empty_role_list() {
        let records = vec![record(1, "spring-5-group-chat", None, &[(10, "Mentors")])];
        let matches = match_group_channels(&records, "group-chat");
        assert!(matches[0].roles.is_empty());
        assert!(matches[0].mention_role().is_none());
    }

    #[test]
    fn orders_by_category_then_number_with_uncategorized_last() {
        let records = vec![
            record(1, "fall-2-group-chat", Some("Fall"), &[]),
            record(2, "misc-9-group-chat", None, &[]),
            record(3, "fall-1-group-chat", Some("Fall"), &[]),
            record(4, "spring-1-group-chat", Some("Spring"), &[]),
        ];
        let ids: Vec<_> = match_group_channels(&records, "group-chat")
            .iter()
            .map(|m| m.channel.id.0)
            .collect();
        assert_eq!(ids, vec![3, 1, 4, 2]);
    }
}
