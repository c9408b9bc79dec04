pub mod watch;

use anyhow::{Context, Result};

use crate::config::FileConfig;
use crate::models::SharedObject;
use crate::ws::{Envelope, Operation};
use watch::{BoardEndpoint, WatchError};

/// `board-sync watch`: print the board's objects, then every change as it
/// is broadcast.
pub async fn watch_command(url: &str, board_id: &str, token: &str) -> Result<()> {
    let endpoint = BoardEndpoint::new(url, board_id, token);

    let objects = match watch::fetch_snapshot(&endpoint).await {
        Ok(objects) => objects,
        Err(WatchError::Unavailable) => {
            eprintln!("[board-sync: server at {} is not reachable]", url);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("{} objects on {}", objects.len(), board_id);
    for object in &objects {
        println!("  {}", describe_object(object));
    }

    match watch::watch(&endpoint, |envelope| println!("{}", describe(&envelope))).await {
        Ok(()) => {
            eprintln!("[board-sync: connection closed]");
            Ok(())
        }
        Err(WatchError::Unavailable) => {
            eprintln!("[board-sync: server stopped]");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// `board-sync config`: print the effective configuration as TOML.
pub fn config_command(config: &FileConfig) -> Result<()> {
    print!("{}", render_config(config)?);
    Ok(())
}

/// Effective configuration as config.toml text.
fn render_config(config: &FileConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to render configuration")
}

fn describe_object(object: &SharedObject) -> String {
    let mut line = format!(
        "{} {} at ({}, {}) {}x{}",
        object.id, object.kind, object.x, object.y, object.width, object.height
    );
    if let Some(lock) = &object.focus {
        line.push_str(&format!(" [focused by {}]", lock.owner_name));
    }
    line
}

fn describe(envelope: &Envelope) -> String {
    match &envelope.op {
        Operation::Update(object) => format!("updated  {}", describe_object(object)),
        Operation::Focus(id) => format!("focused  {}", id),
        Operation::Blur(id) => format!("blurred  {}", id),
        Operation::Released(object) => format!("released {}", describe_object(object)),
        Operation::Delete(id) => format!("deleted  {}", id),
    }
}
