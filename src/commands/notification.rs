use super::daemon_client;
use crate::args::{DndArg, NotificationCommands};
use anyhow::{Context, Result};
use wigo::config::Config;
use wigo::daemon::{DndCommand, NotificationRequest, Request};
use wigo::notifications::{bus, HintValue, Hints, NotifyRequest};

pub async fn cmd_notification(command: NotificationCommands) -> Result<()> {
    let request = match command {
        NotificationCommands::Notify {
            summary,
            body,
            app_name,
            icon,
            urgency,
            expire_timeout,
            replaces_id,
            actions,
        } => {
            let mut hints = Hints::new();
            hints.insert("urgency".into(), HintValue::Int(urgency.level()));
            let request = NotifyRequest {
                app_name,
                replaces_id,
                app_icon: icon,
                summary,
                body,
                actions: parse_actions(&actions)?,
                hints,
                expire_timeout,
            };
            let id = bus::send_notification(&request)
                .await
                .context("failed to send notification")?;
            println!("{id}");
            return Ok(());
        }
        NotificationCommands::Close { id } => NotificationRequest::Close(id),
        NotificationCommands::Dismiss { id } => NotificationRequest::Dismiss(id),
        NotificationCommands::Action { id, key } => NotificationRequest::Action { id, key },
        NotificationCommands::Dnd { state } => NotificationRequest::Dnd(match state {
            DndArg::On => DndCommand::On,
            DndArg::Off => DndCommand::Off,
            DndArg::Toggle => DndCommand::Toggle,
            DndArg::State => DndCommand::State,
        }),
        NotificationCommands::ClearHistory => NotificationRequest::Clear,
        NotificationCommands::Count => NotificationRequest::Count,
        NotificationCommands::History => NotificationRequest::History,
    };

    let config = Config::load().context("failed to load config")?;
    let reply = daemon_client(&config)
        .send(&Request::Notification(request))
        .await
        .context("is the wigo daemon running?")?;
    if !reply.is_ok() {
        anyhow::bail!("daemon refused: {}", reply.message());
    }
    println!("{}", reply.message());
    Ok(())
}

/// `KEY=LABEL` pairs flattened into the protocol's `[key, label, ...]` list.
fn parse_actions(actions: &[String]) -> Result<Vec<String>> {
    let mut flat = Vec::with_capacity(actions.len() * 2);
    for action in actions {
        let (key, label) = action
            .split_once('=')
            .with_context(|| format!("action '{action}' is not KEY=LABEL"))?;
        flat.push(key.to_string());
        flat.push(label.to_string());
    }
    Ok(flat)
}
