//! Subcommand handlers.

use anyhow::{bail, Result};
use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use agquota_core::process::mask_token;
use agquota_core::{
    CoreEvent, CycleOutcome, DiscoveryBackend, QuotaCoreBuilder, Settings, SystemBackend,
};

use crate::render::{event_line, selected_line, status_table, EventLine, StatusReport};

/// Run one cycle and print the result
pub async fn status(settings: Settings, json: bool) -> Result<()> {
    let core = QuotaCoreBuilder::new(settings).build()?;

    match core.refresh_now().await {
        CycleOutcome::Parsed(snapshot) => {
            let selected = core.selected_model();
            if json {
                let report = StatusReport::new(&snapshot, &selected);
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", status_table(&snapshot, &selected, Utc::now()));
            }
            Ok(())
        }
        CycleOutcome::Failed(err) => bail!("{} ({})", err, err.kind().display_name()),
        CycleOutcome::Skipped => bail!("a refresh was already in progress"),
    }
}

/// Poll until Ctrl-C, printing one line per event
pub async fn watch(settings: Settings, json: bool) -> Result<()> {
    let core = QuotaCoreBuilder::new(settings).build()?;
    let mut events = core.subscribe();
    core.start();

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => print_event(&core, &event, json)?,
                Err(RecvError::Lagged(n)) => warn!("Dropped {} events", n),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    core.shutdown().await;
    Ok(())
}

fn print_event(core: &agquota_core::QuotaCore, event: &CoreEvent, json: bool) -> Result<()> {
    let snapshot = core.latest_snapshot();
    let selected = core.selected_model();

    if json {
        let line = EventLine::new(event, &snapshot, &selected);
        println!("{}", serde_json::to_string(&line)?);
        return Ok(());
    }

    match event_line(event) {
        Some(line) => println!("{}", line),
        None => println!("{}", selected_line(&snapshot, &selected, Utc::now())),
    }
    Ok(())
}

/// Run only the discovery stages and report what was found
pub async fn locate(settings: Settings) -> Result<()> {
    let backend = SystemBackend::new(&settings)?;
    println!("platform: {}", backend.platform().display_name());

    let pid = backend.locate().await?;
    println!("pid:      {}", pid);

    let (token, ports) = tokio::join!(backend.extract_token(pid), backend.scan_ports(pid));
    match token {
        Ok(token) => println!("token:    {}", mask_token(&token)),
        Err(e) => println!("token:    ({})", e),
    }

    if ports.is_empty() {
        println!("ports:    (none)");
    } else {
        let list: Vec<String> = ports.iter().map(u16::to_string).collect();
        println!("ports:    {}", list.join(", "));
    }
    Ok(())
}
