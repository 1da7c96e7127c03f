//! Discord adapter (serenity).
//!
//! Implements the `herald-core` ports over the Discord API and hosts the
//! slash-command gateway loop.

use std::sync::Arc;

use serenity::all::{Client, Command, Context, EventHandler, GatewayIntents, Interaction, Ready};
use serenity::async_trait;
use serenity::http::Http;
use tracing::{error, info};

use herald_core::{
    audit::AuditLogger,
    config::Config,
    ports::{Directory, Messenger},
    scheduler::ReminderScheduler,
};

pub mod commands;
pub mod format;
pub mod gateway;

use gateway::DiscordGateway;

pub struct BotState {
    pub cfg: Config,
    pub scheduler: ReminderScheduler,
    pub messenger: Arc<dyn Messenger>,
    pub directory: Arc<dyn Directory>,
    pub audit: AuditLogger,
}

struct Handler {
    state: Arc<BotState>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, "logged in");
        match Command::set_global_commands(&ctx.http, commands::definitions()).await {
            Ok(synced) => info!(count = synced.len(), "synced global commands"),
            Err(e) => error!(%e, "failed to sync global commands"),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(cmd) => commands::dispatch(&ctx, &cmd, &self.state).await,
            Interaction::Component(comp) => {
                commands::handle_component(&ctx, &comp, &self.state).await
            }
            _ => {}
        }
    }
}

/// Build the gateway client and run until the process is stopped.
pub async fn run(cfg: Config) -> anyhow::Result<()> {
    // Outbound calls (ports) use their own HTTP handle; the gateway client
    // owns a separate one for the event loop.
    let http = Arc::new(Http::new(&cfg.discord_token));
    let platform = Arc::new(DiscordGateway::new(http));
    let messenger: Arc<dyn Messenger> = platform.clone();
    let directory: Arc<dyn Directory> = platform;

    let audit = AuditLogger::new(cfg.audit_log_path.clone(), cfg.audit_log_json);
    let scheduler =
        ReminderScheduler::new(&cfg, directory.clone(), messenger.clone(), audit.clone());

    let state = Arc::new(BotState {
        cfg: cfg.clone(),
        scheduler,
        messenger,
        directory,
        audit,
    });

    // GUILD_MEMBERS is privileged but required for the member listing behind
    // the DM fan-out commands.
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MEMBERS;
    let mut client = Client::builder(&cfg.discord_token, intents)
        .event_handler(Handler { state })
        .await?;

    client.start().await?;
    Ok(())
}
