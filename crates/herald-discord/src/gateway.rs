//! Port implementations over the Discord HTTP API.
//!
//! Everything the core needs from Discord flows through here, mapped into the
//! narrow domain shapes so the rest of the bot never touches client types.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{ChannelType, PermissionOverwriteType};
use serenity::http::{Http, HttpError};

use herald_core::{
    domain::{ChannelId, ChannelInfo, ChannelRecord, GuildId, RoleId, RoleInfo, UserId},
    ports::{Directory, Messenger},
    Error, Result,
};

const MEMBER_PAGE_SIZE: u64 = 1000;

#[derive(Clone)]
pub struct DiscordGateway {
    http: Arc<Http>,
}

impl DiscordGateway {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    async fn all_members(
        &self,
        guild: serenity::all::GuildId,
    ) -> Result<Vec<serenity::all::Member>> {
        let mut members = Vec::new();
        let mut after: Option<serenity::all::UserId> = None;
        loop {
            let page = guild
                .members(&self.http, Some(MEMBER_PAGE_SIZE), after)
                .await
                .map_err(map_err)?;
            let full_page = page.len() as u64 == MEMBER_PAGE_SIZE;
            after = page.last().map(|m| m.user.id);
            members.extend(page);
            if !full_page {
                return Ok(members);
            }
        }
    }
}

#[async_trait]
impl Messenger for DiscordGateway {
    async fn send_channel(&self, channel: ChannelId, text: &str) -> Result<()> {
        serenity::all::ChannelId::new(channel.0)
            .say(&self.http, text)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn send_direct(&self, user: UserId, text: &str) -> Result<()> {
        let dm = serenity::all::UserId::new(user.0)
            .create_dm_channel(&self.http)
            .await
            .map_err(map_err)?;
        dm.id.say(&self.http, text).await.map_err(map_err)?;
        Ok(())
    }
}

#[async_trait]
impl Directory for DiscordGateway {
    async fn guild_channels(&self, guild: GuildId) -> Result<Vec<ChannelRecord>> {
        let gid = serenity::all::GuildId::new(guild.0);
        let channels = gid.channels(&self.http).await.map_err(map_err)?;
        let roles = gid.roles(&self.http).await.map_err(map_err)?;

        let categories: HashMap<serenity::all::ChannelId, String> = channels
            .iter()
            .filter(|(_, ch)| ch.kind == ChannelType::Category)
            .map(|(id, ch)| (*id, ch.name.clone()))
            .collect();

        let mut records = Vec::new();
        for (id, ch) in &channels {
            if ch.kind != ChannelType::Text {
                continue;
            }
            let overwrite_roles = ch
                .permission_overwrites
                .iter()
                .filter_map(|ow| match ow.kind {
                    PermissionOverwriteType::Role(rid) => roles.get(&rid).map(|role| RoleInfo {
                        id: RoleId(rid.get()),
                        name: role.name.clone(),
                    }),
                    _ => None,
                })
                .collect();

            records.push(ChannelRecord {
                channel: ChannelInfo {
                    id: ChannelId(id.get()),
                    name: ch.name.clone(),
                    category_name: ch
                        .parent_id
                        .and_then(|parent| categories.get(&parent).cloned()),
                },
                overwrite_roles,
            });
        }
        Ok(records)
    }

    async fn resolve_roles(&self, guild: GuildId, ids: &[RoleId]) -> Result<Vec<RoleInfo>> {
        let gid = serenity::all::GuildId::new(guild.0);
        let roles = gid.roles(&self.http).await.map_err(map_err)?;
        Ok(ids
            .iter()
            .filter_map(|rid| {
                roles
                    .get(&serenity::all::RoleId::new(rid.0))
                    .map(|role| RoleInfo {
                        id: *rid,
                        name: role.name.clone(),
                    })
            })
            .collect())
    }

    async fn role_members(&self, guild: GuildId, roles: &[RoleId]) -> Result<Vec<UserId>> {
        let gid = serenity::all::GuildId::new(guild.0);
        let wanted: HashSet<serenity::all::RoleId> = roles
            .iter()
            .map(|r| serenity::all::RoleId::new(r.0))
            .collect();

        let mut holders = BTreeSet::new();
        for member in self.all_members(gid).await? {
            if member.roles.iter().any(|r| wanted.contains(r)) {
                holders.insert(UserId(member.user.id.get()));
            }
        }
        Ok(holders.into_iter().collect())
    }

    async fn known_members(&self, guild: GuildId, ids: &[UserId]) -> Result<Vec<UserId>> {
        let gid = serenity::all::GuildId::new(guild.0);
        let mut known = Vec::new();
        for id in ids {
            if gid
                .member(&self.http, serenity::all::UserId::new(id.0))
                .await
                .is_ok()
            {
                known.push(*id);
            }
        }
        Ok(known)
    }
}

pub(crate) fn map_err(e: serenity::Error) -> Error {
    match &e {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp))
            if resp.status_code.as_u16() == 403 =>
        {
            Error::Permission(resp.error.message.clone())
        }
        _ => Error::Transport(format!("discord error: {e}")),
    }
}
