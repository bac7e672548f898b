//! assetlink-ctl: command-line client for an AssetLink server.

use std::path::Path;

use anyhow::{bail, Context, Result};

use assetlink_client::{EventCapsule, NetworkEvent, OperationManager};
use assetlink_core::config::ClientConfig;
use assetlink_core::FileType;

// ── Event helpers ─────────────────────────────────────────────────────────────

fn print_capsule(capsule: &EventCapsule) {
    match serde_json::to_string(capsule) {
        Ok(line) => println!("{line}"),
        Err(_) => println!("{capsule:?}"),
    }
}

/// Print events until `done` matches one. A `Suspended` event ends the wait
/// with an error.
async fn wait_for(
    manager: &OperationManager,
    done: impl Fn(&EventCapsule) -> bool,
) -> Result<EventCapsule> {
    loop {
        let capsule = manager
            .dequeue_event()
            .await
            .context("event queue closed")?;
        print_capsule(&capsule);
        if done(&capsule) {
            return Ok(capsule);
        }
        if capsule.event == NetworkEvent::Suspended {
            bail!("connection suspended: {:?}", capsule.error);
        }
    }
}

/// Block until the connection has a user id, requesting one if needed.
async fn ensure_user_id(manager: &OperationManager) -> Result<u32> {
    if manager.user_id() != 0 {
        return Ok(manager.user_id());
    }
    let capsule = wait_for(manager, |c| {
        matches!(
            c.event,
            NetworkEvent::IdRequestDone | NetworkEvent::IdRequestFailed
        )
    })
    .await?;
    if !capsule.is_success() {
        bail!("id request failed: {:?}", capsule.error);
    }
    Ok(capsule.user_id)
}

fn parse_file_type(s: &str) -> Result<FileType> {
    match s {
        "dlc" => Ok(FileType::Dlc),
        "user" => Ok(FileType::User),
        other => bail!("unknown file type '{other}', expected dlc or user"),
    }
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn cmd_id(manager: &OperationManager) -> Result<()> {
    let user_id = ensure_user_id(manager).await?;
    println!("user id: {user_id}");
    Ok(())
}

async fn cmd_get(manager: &OperationManager, name: &str, file_type: FileType) -> Result<()> {
    ensure_user_id(manager).await?;
    let id = manager.request_file(name, file_type)?;
    let capsule = wait_for(manager, |c| c.operation_id == id).await?;
    if !capsule.is_success() {
        bail!("download of {name} failed: {:?}", capsule.error);
    }

    let Some(file) = capsule.file else {
        bail!("download of {name} finished without data");
    };
    let dir = &manager.config().transfer.download_dir;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let target = dir.join(if file.file_name.is_empty() {
        name
    } else {
        file.file_name.as_str()
    });
    std::fs::write(&target, &file.data)
        .with_context(|| format!("failed to write {}", target.display()))?;
    println!("saved {} bytes to {}", file.data.len(), target.display());
    Ok(())
}

async fn cmd_put(manager: &OperationManager, path: &str, name: Option<&str>) -> Result<()> {
    let data = std::fs::read(path).with_context(|| format!("failed to read file: {path}"))?;
    let name = match name {
        Some(n) => n.to_string(),
        None => Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .context("path has no usable file name, pass one explicitly")?
            .to_string(),
    };

    ensure_user_id(manager).await?;
    let id = manager.save_user_file(&name, data)?;
    let capsule = wait_for(manager, |c| c.operation_id == id).await?;
    if !capsule.is_success() {
        bail!("upload of {name} failed: {:?}", capsule.error);
    }
    println!("saved {name} on the server");
    Ok(())
}

fn print_usage() {
    println!("Usage: assetlink-ctl [--host <addr>] [--port <port>] [--user <id>] <command>");
    println!();
    println!("Commands:");
    println!("  id                    Request a new user id");
    println!("  get <name> [dlc|user] Download a file (default: dlc)");
    println!("  put <path> [name]     Upload a user file");
    println!();
    println!("Options:");
    println!("  --host <addr>   Server address (default from config)");
    println!("  --port <port>   Server port (default from config)");
    println!("  --user <id>     User id to present; 0 requests a new one");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = ClientConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = ClientConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        ClientConfig::default()
    });

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                config.server.address = args.get(i).context("--host requires a value")?.clone();
            }
            "--port" => {
                i += 1;
                config.server.port = args
                    .get(i)
                    .context("--port requires a value")?
                    .parse()
                    .context("--port must be a number")?;
            }
            "--user" => {
                i += 1;
                config.identity.user_id = args
                    .get(i)
                    .context("--user requires a value")?
                    .parse()
                    .context("--user must be a number")?;
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    if matches!(remaining.as_slice(), [] | ["help"] | ["--help"] | ["-h"]) {
        print_usage();
        return Ok(());
    }

    // A fresh id is requested by connecting without one.
    if remaining.as_slice() == ["id"] {
        config.identity.user_id = 0;
    }

    let mut manager = OperationManager::new(config);
    manager
        .connect_configured()
        .await
        .context("failed to connect to asset server")?;

    let result = match remaining.as_slice() {
        ["id"] => cmd_id(&manager).await,
        ["get", name] => cmd_get(&manager, name, FileType::Dlc).await,
        ["get", name, kind] => match parse_file_type(kind) {
            Ok(file_type) => cmd_get(&manager, name, file_type).await,
            Err(e) => Err(e),
        },
        ["put", path] => cmd_put(&manager, path, None).await,
        ["put", path, name] => cmd_put(&manager, path, Some(*name)).await,
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            let _ = manager.shutdown();
            std::process::exit(1);
        }
    };

    if manager.shutdown().is_ok() {
        wait_for(&manager, |c| c.event == NetworkEvent::Suspended)
            .await
            .ok();
    }
    result
}
