//! Slash-command definitions and dispatch.
//!
//! Validation failures (bad time expression, unknown role/user, used outside
//! a guild) are replied to the requester and are not system errors; only
//! transport-level failures bubble up to the dispatch error path.

use std::collections::HashSet;
use std::hash::Hash;
use std::time::Instant;

use serenity::all::{
    ButtonStyle, CommandInteraction, CommandOptionType, ComponentInteraction, Context,
    CreateActionRow, CreateButton, CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseFollowup, CreateInteractionResponseMessage, EditInteractionResponse,
    Mentionable, ResolvedValue,
};
use tracing::{error, warn};

use herald_core::{
    audit::AuditEvent,
    delivery,
    domain::{ChannelId, GuildId, ReminderId},
    mentions,
    scheduler::{CancelOutcome, ReminderRequest},
    targets, Error, Result,
};

use crate::{format, gateway::map_err, BotState};

const CANCEL_PREFIX: &str = "cancel-reminder:";

pub fn definitions() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("ping").description("Report round-trip latency"),
        CreateCommand::new("senddmbyrole")
            .description("DM every member holding any of the referenced roles")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "message",
                    "The message to be sent to each role member",
                )
                .required(true),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "roles",
                    "Enter as many roles as you wish to DM",
                )
                .required(true),
            ),
        CreateCommand::new("senddm")
            .description("DM every referenced user")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "message",
                    "The message to be sent to each member",
                )
                .required(true),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "users",
                    "Enter as many users as you wish to DM",
                )
                .required(true),
            ),
        CreateCommand::new("verifyroles").description("Verify each role against the channel name"),
        CreateCommand::new("set_reminder")
            .description("Set a reminder to send messages to channels")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "reminder_time",
                    "When the reminder should fire",
                )
                .required(true),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "reminder_message",
                    "The message to broadcast",
                )
                .required(true),
            ),
    ]
}

pub async fn dispatch(ctx: &Context, cmd: &CommandInteraction, state: &BotState) {
    let name = cmd.data.name.clone();
    state.audit.record(AuditEvent::command(
        cmd.user.id.get(),
        &cmd.user.name,
        &name,
        &summarize_args(cmd),
    ));

    let result = match name.as_str() {
        "ping" => ping(ctx, cmd).await,
        "senddmbyrole" => send_dm_by_role(ctx, cmd, state).await,
        "senddm" => send_dm(ctx, cmd, state).await,
        "verifyroles" => verify_roles(ctx, cmd, state).await,
        "set_reminder" => set_reminder(ctx, cmd, state).await,
        other => {
            warn!(command = other, "unknown command");
            respond(ctx, cmd, "Unknown command.", true).await
        }
    };

    if let Err(e) = result {
        error!(command = %name, %e, "command failed");
        state.audit.record(AuditEvent::error(
            cmd.user.id.get(),
            &cmd.user.name,
            &name,
            &e.to_string(),
        ));
        let _ = followup_or_respond(ctx, cmd, "Something went wrong handling the command.").await;
    }
}

/// Cancel-button clicks for scheduled reminders.
pub async fn handle_component(ctx: &Context, comp: &ComponentInteraction, state: &BotState) {
    let Some(raw) = comp.data.custom_id.strip_prefix(CANCEL_PREFIX) else {
        return;
    };
    let Ok(id) = raw.parse::<u64>() else {
        warn!(custom_id = %comp.data.custom_id, "malformed cancel component id");
        return;
    };

    match state.scheduler.cancel(ReminderId(id)).await {
        CancelOutcome::Cancelled => {
            // Update the original message and strip the button so it cannot
            // be clicked again.
            let update = CreateInteractionResponseMessage::new()
                .content("Reminder cancelled.")
                .components(Vec::new());
            if let Err(e) = comp
                .create_response(&ctx.http, CreateInteractionResponse::UpdateMessage(update))
                .await
            {
                error!(reminder = id, e = %e, "failed to acknowledge cancellation");
            }
        }
        CancelOutcome::AlreadyFinished => {
            let msg = CreateInteractionResponseMessage::new()
                .content("This reminder already finished.")
                .ephemeral(true);
            if let Err(e) = comp
                .create_response(&ctx.http, CreateInteractionResponse::Message(msg))
                .await
            {
                error!(reminder = id, e = %e, "failed to answer cancel interaction");
            }
        }
    }
}

async fn ping(ctx: &Context, cmd: &CommandInteraction) -> Result<()> {
    let started = Instant::now();
    ctx.http.get_current_user().await.map_err(map_err)?;
    let latency_ms = started.elapsed().as_millis();
    respond(
        ctx,
        cmd,
        &format!("{latency_ms}ms {}!", cmd.user.mention()),
        false,
    )
    .await
}

async fn send_dm_by_role(ctx: &Context, cmd: &CommandInteraction, state: &BotState) -> Result<()> {
    let Some(guild) = cmd.guild_id else {
        return respond(ctx, cmd, "Command must be used within a server.", true).await;
    };
    let message = str_option(cmd, "message");
    let roles_arg = str_option(cmd, "roles");

    let role_ids = dedupe(&mentions::role_ids(&roles_arg));
    if role_ids.is_empty() {
        return respond(ctx, cmd, "No role mentions found.", true).await;
    }

    // Member listing can be slow on large guilds; defer past the 3s window.
    defer(ctx, cmd).await?;

    let guild = GuildId(guild.get());
    let resolved = state.directory.resolve_roles(guild, &role_ids).await?;
    if resolved.len() != role_ids.len() {
        return edit_reply(ctx, cmd, "One or more roles not found.").await;
    }

    let members = state.directory.role_members(guild, &role_ids).await?;
    let report = delivery::send_dms(
        state.messenger.as_ref(),
        &members,
        &message,
        state.cfg.dm_batch_size,
    )
    .await;

    edit_reply(ctx, cmd, &delivery_note(report)).await
}

async fn send_dm(ctx: &Context, cmd: &CommandInteraction, state: &BotState) -> Result<()> {
    let Some(guild) = cmd.guild_id else {
        return respond(ctx, cmd, "Command must be used within a server.", true).await;
    };
    let message = str_option(cmd, "message");
    let users_arg = str_option(cmd, "users");

    let user_ids = dedupe(&mentions::user_ids(&users_arg));
    if user_ids.is_empty() {
        return respond(ctx, cmd, "No user mentions found.", true).await;
    }

    defer(ctx, cmd).await?;

    let guild = GuildId(guild.get());
    let known = state.directory.known_members(guild, &user_ids).await?;
    if known.len() != user_ids.len() {
        return edit_reply(ctx, cmd, "One or more users not found.").await;
    }

    let report = delivery::send_dms(
        state.messenger.as_ref(),
        &known,
        &message,
        state.cfg.dm_batch_size,
    )
    .await;

    edit_reply(ctx, cmd, &delivery_note(report)).await
}

async fn verify_roles(ctx: &Context, cmd: &CommandInteraction, state: &BotState) -> Result<()> {
    let Some(guild) = cmd.guild_id else {
        return respond(ctx, cmd, "Command must be used within a server.", true).await;
    };

    defer(ctx, cmd).await?;

    let records = state.directory.guild_channels(GuildId(guild.get())).await?;
    let matches = targets::match_group_channels(&records, &state.cfg.channel_search_string);

    let mut response = format::format_channel_matches(&matches);
    if response.is_empty() {
        response = "No channels found or no roles match your criteria.".to_string();
    }
    edit_reply(ctx, cmd, &response).await
}

async fn set_reminder(ctx: &Context, cmd: &CommandInteraction, state: &BotState) -> Result<()> {
    let Some(guild) = cmd.guild_id else {
        return respond(ctx, cmd, "Command must be used within a server.", true).await;
    };
    let time_expression = str_option(cmd, "reminder_time");
    let message = str_option(cmd, "reminder_message");

    let request = ReminderRequest {
        guild: GuildId(guild.get()),
        origin: ChannelId(cmd.channel_id.get()),
        time_expression,
        message,
    };

    match state.scheduler.schedule(request).await {
        Ok(scheduled) => {
            let content = format!(
                "Reminder set for {} hours and {} minutes from now.",
                scheduled.delay.hours, scheduled.delay.minutes
            );
            let cancel_button = CreateButton::new(format!("{CANCEL_PREFIX}{}", scheduled.id))
                .label("Cancel")
                .style(ButtonStyle::Danger);
            let msg = CreateInteractionResponseMessage::new()
                .content(content)
                .components(vec![CreateActionRow::Buttons(vec![cancel_button])]);
            cmd.create_response(&ctx.http, CreateInteractionResponse::Message(msg))
                .await
                .map_err(map_err)
        }
        Err(e @ (Error::Parse(_) | Error::Range(_))) => {
            respond(ctx, cmd, &format!("Cannot schedule that reminder: {e}"), true).await
        }
        Err(e) => Err(e),
    }
}

fn str_option(cmd: &CommandInteraction, name: &str) -> String {
    for opt in cmd.data.options() {
        if opt.name == name {
            if let ResolvedValue::String(s) = opt.value {
                return s.to_string();
            }
        }
    }
    String::new()
}

fn summarize_args(cmd: &CommandInteraction) -> String {
    cmd.data
        .options()
        .iter()
        .map(|o| match &o.value {
            ResolvedValue::String(s) => format!("{}={s}", o.name),
            _ => o.name.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn dedupe<T: Copy + Eq + Hash>(items: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    items.iter().copied().filter(|i| seen.insert(*i)).collect()
}

fn delivery_note(report: delivery::DeliveryReport) -> String {
    let mut note = format!("Message sent to {} members.", report.sent);
    if report.failed > 0 {
        note.push_str(&format!(" {} could not be reached.", report.failed));
    }
    note
}

async fn respond(
    ctx: &Context,
    cmd: &CommandInteraction,
    content: &str,
    ephemeral: bool,
) -> Result<()> {
    let msg = CreateInteractionResponseMessage::new()
        .content(content)
        .ephemeral(ephemeral);
    cmd.create_response(&ctx.http, CreateInteractionResponse::Message(msg))
        .await
        .map_err(map_err)
}

async fn defer(ctx: &Context, cmd: &CommandInteraction) -> Result<()> {
    cmd.defer(&ctx.http).await.map_err(map_err)
}

async fn edit_reply(ctx: &Context, cmd: &CommandInteraction, content: &str) -> Result<()> {
    cmd.edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await
        .map_err(map_err)?;
    Ok(())
}

async fn followup_or_respond(ctx: &Context, cmd: &CommandInteraction, content: &str) -> Result<()> {
    if respond(ctx, cmd, content, true).await.is_ok() {
        return Ok(());
    }
    cmd.create_followup(
        &ctx.http,
        CreateInteractionResponseFollowup::new()
            .content(content)
            .ephemeral(true),
    )
    .await
    .map_err(map_err)?;
    Ok(())
}
