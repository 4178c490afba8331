//! Manage scheduled messages in the link database.
//!
//! These commands edit records through the store directly. A running
//! link does not watch the database, so changes made here are picked up
//! the next time the link starts; anything already due by then goes out
//! in the startup sweep.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};

use link_core::{ScheduleStatus, ScheduledMessage};
use link_desktop::LinkStore;

/// Queue a message for a future send.
pub async fn add(
    store: &dyn LinkStore,
    to: String,
    name: Option<String>,
    body: String,
    when: DateTime<Utc>,
) -> Result<()> {
    let message = ScheduledMessage::new(to, name, body, when, Utc::now());
    store
        .upsert_schedule(&message)
        .await
        .context("Failed to save the scheduled message")?;

    println!("Scheduled {}", message.id);
    println!("  To:   {}", recipient_label(&message));
    println!("  When: {}", format_time(message.scheduled_time));

    Ok(())
}

/// List every scheduled message, soonest first.
pub async fn list(store: &dyn LinkStore) -> Result<()> {
    let messages = store
        .load_schedules()
        .await
        .context("Failed to load scheduled messages")?;

    if messages.is_empty() {
        println!("No scheduled messages.");
        return Ok(());
    }

    for message in &messages {
        print_message(message);
    }

    Ok(())
}

/// Cancel a pending message. The record stays listed as cancelled.
pub async fn cancel(store: &dyn LinkStore, id: &str) -> Result<()> {
    let messages = store
        .load_schedules()
        .await
        .context("Failed to load scheduled messages")?;
    let mut message = find_by_prefix(&messages, id)?.clone();

    if !message.cancel() {
        println!(
            "{} is already {}, nothing to cancel",
            message.id,
            status_label(message.status)
        );
        return Ok(());
    }

    store
        .upsert_schedule(&message)
        .await
        .context("Failed to save the cancellation")?;

    println!("Cancelled {}", message.id);
    Ok(())
}

/// Delete a message record in any state.
pub async fn delete(store: &dyn LinkStore, id: &str) -> Result<()> {
    let messages = store
        .load_schedules()
        .await
        .context("Failed to load scheduled messages")?;
    let message = find_by_prefix(&messages, id)?;

    store
        .delete_schedule(message.id)
        .await
        .context("Failed to delete the scheduled message")?;

    println!("Deleted {}", message.id);
    Ok(())
}

/// Resolve an id prefix against the loaded records.
///
/// The prefix must match exactly one record; matching zero or several is
/// an error so a typo never edits the wrong message.
fn find_by_prefix<'a>(
    messages: &'a [ScheduledMessage],
    prefix: &str,
) -> Result<&'a ScheduledMessage> {
    if prefix.is_empty() {
        bail!("Message id must not be empty");
    }

    let mut matches = messages
        .iter()
        .filter(|m| m.id.to_string().starts_with(prefix));

    let Some(found) = matches.next() else {
        bail!("No scheduled message matches '{prefix}'");
    };
    if matches.next().is_some() {
        bail!("'{prefix}' matches more than one message, use more of the id");
    }

    Ok(found)
}

fn print_message(message: &ScheduledMessage) {
    println!(
        "{}  {:<9}  {}  {}",
        message.id,
        status_label(message.status),
        format_time(message.scheduled_time),
        recipient_label(message),
    );
    println!("    {}", message.body);
    match message.status {
        ScheduleStatus::Sent => {
            if let Some(at) = message.sent_at {
                println!("    sent {}", format_time(at));
            }
        }
        ScheduleStatus::Failed => {
            if let Some(error) = &message.error_message {
                println!("    error: {error}");
            }
        }
        _ => {}
    }
}

fn recipient_label(message: &ScheduledMessage) -> String {
    match &message.recipient_name {
        Some(name) => format!("{} ({name})", message.recipient_number),
        None => message.recipient_number.clone(),
    }
}

fn status_label(status: ScheduleStatus) -> &'static str {
    match status {
        ScheduleStatus::Pending => "pending",
        ScheduleStatus::Sent => "sent",
        ScheduleStatus::Failed => "failed",
        ScheduleStatus::Cancelled => "cancelled",
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
