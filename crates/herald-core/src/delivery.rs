//! Concurrent fan-out delivery with per-recipient failure tolerance.
//!
//! Sends are issued in fixed-size batches; each send is independently
//! fallible and a failure never aborts its siblings. Failures are counted and
//! logged, not propagated.

use futures::future::join_all;

use crate::{
    domain::{ChannelMatch, UserId},
    mentions,
    ports::Messenger,
    Error,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
    /// Channels that received the bare message because no role aligned.
    pub without_role: usize,
}

/// DM `message` to every user, `batch` sends at a time.
pub async fn send_dms(
    messenger: &dyn Messenger,
    users: &[UserId],
    message: &str,
    batch: usize,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for chunk in users.chunks(batch.max(1)) {
        let sends = chunk.iter().map(|user| async move {
            let res = messenger.send_direct(*user, message).await;
            (*user, res)
        });
        for (user, res) in join_all(sends).await {
            match res {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    log_send_failure("DM", &format!("user {}", user.0), &e);
                }
            }
        }
    }
    report
}

/// Broadcast `message` to every matched channel, appending the aligned role's
/// mention token where one exists.
pub async fn broadcast(
    messenger: &dyn Messenger,
    matches: &[ChannelMatch],
    message: &str,
    batch: usize,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    for chunk in matches.chunks(batch.max(1)) {
        let sends = chunk.iter().map(|target| async move {
            let text = match target.mention_role() {
                Some(role) => format!("{message} {}", mentions::role_mention(role.id)),
                None => {
                    tracing::warn!(
                        channel = %target.channel.name,
                        "no aligned role for channel, sending bare message"
                    );
                    message.to_string()
                }
            };
            let res = messenger.send_channel(target.channel.id, &text).await;
            (target, res)
        });
        for (target, res) in join_all(sends).await {
            if target.mention_role().is_none() {
                report.without_role += 1;
            }
            match res {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    log_send_failure("broadcast", &target.channel.name, &e);
                }
            }
        }
    }
    report
}

fn log_send_failure(kind: &str, recipient: &str, err: &Error) {
    match err {
        Error::Permission(_) => {
            tracing::warn!(%recipient, %err, "{kind} send forbidden");
        }
        _ => {
            tracing::error!(%recipient, %err, "{kind} send failed");
        }
    }
}
