use std::fmt;

/// Discord user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

/// Discord role id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RoleId(pub u64);

/// Discord channel id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u64);

/// Discord guild (server) id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GuildId(pub u64);

/// Identifier for a scheduled reminder, unique for the process lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReminderId(pub u64);

impl fmt::Display for ReminderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The narrow channel shape the core consumes, never the client's full type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub category_name: Option<String>,
}

/// The narrow role shape the core consumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleInfo {
    pub id: RoleId,
    pub name: String,
}

/// A guild channel together with the roles granted access to it through
/// permission overwrites. Produced by the directory port.
#[derive(Clone, Debug)]
pub struct ChannelRecord {
    pub channel: ChannelInfo,
    pub overwrite_roles: Vec<RoleInfo>,
}

/// A channel selected for broadcast, with every role whose name aligns with
/// the channel's number. The first role is the one mentioned in broadcasts.
#[derive(Clone, Debug)]
pub struct ChannelMatch {
    pub channel: ChannelInfo,
    pub roles: Vec<RoleInfo>,
}

impl ChannelMatch {
    /// The role mentioned when broadcasting to this channel.
    pub fn mention_role(&self) -> Option<&RoleInfo> {
        self.roles.first()
    }
}
