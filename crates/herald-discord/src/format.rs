//! Discord-markdown rendering of channel/role audit results.

use herald_core::domain::ChannelMatch;

// Leave room under the 2000-char message limit for extra characters.
const MAX_RESPONSE_LEN: usize = 1900;

/// One line per matched channel, capped so the reply fits in one message.
pub fn format_channel_matches(matches: &[ChannelMatch]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut used = 0usize;

    for item in matches {
        let role_names = if item.roles.is_empty() {
            "No matching roles".to_string()
        } else {
            item.roles
                .iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let category = item.channel.category_name.as_deref().unwrap_or("No Category");
        let line = format!(
            "**{category} {}** - Accessible by: {role_names}",
            item.channel.name
        );

        if used + line.len() + 1 > MAX_RESPONSE_LEN {
            lines.push("...and more".to_string());
            break;
        }
        used += line.len() + 1;
        lines.push(line);
    }

    lines.join("\n")
}
