use async_trait::async_trait;

use crate::{
    domain::{ChannelId, ChannelRecord, GuildId, RoleId, RoleInfo, UserId},
    Result,
};

/// Outbound message delivery.
///
/// Discord is the first implementation; the shape is narrow enough that the
/// core stays testable with an in-memory fake.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_channel(&self, channel: ChannelId, text: &str) -> Result<()>;
    async fn send_direct(&self, user: UserId, text: &str) -> Result<()>;
}

/// Read access to the guild's member/role/channel directory.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Every guild channel, with the roles granted access through permission
    /// overwrites and the containing category's name resolved.
    async fn guild_channels(&self, guild: GuildId) -> Result<Vec<ChannelRecord>>;

    /// Resolve role ids to roles. Unknown ids are simply absent from the
    /// result; the caller decides whether that is an error.
    async fn resolve_roles(&self, guild: GuildId, ids: &[RoleId]) -> Result<Vec<RoleInfo>>;

    /// The union of members holding any of the given roles, deduplicated.
    async fn role_members(&self, guild: GuildId, roles: &[RoleId]) -> Result<Vec<UserId>>;

    /// Which of the given users are current guild members.
    async fn known_members(&self, guild: GuildId, ids: &[UserId]) -> Result<Vec<UserId>>;
}
