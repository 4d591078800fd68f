//! Scan station
//!
//! Reads one RFID tag per line from stdin, as sent by keyboard-wedge card
//! readers. Tags are admitted to a shared sequencer in the order they are
//! read and applied on the blocking pool, so a slow store never reorders
//! scans.

use anyhow::{Context, Result};
use rollcall_api::{AttendanceStatus, ScanIdentity, ScanRequest};
use rollcall_core::{AttendanceEngine, ScanOutcome, ScanSequencer};
use rollcall_store::{AuditEvent, AuditEventType};
use rollcall_util::{EventId, RollcallError};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::SlotArgs;

/// Recent transactions shown when the station stops
const SHUTDOWN_ACTIVITY_COUNT: usize = 10;

type ScanResult = Option<rollcall_util::Result<ScanOutcome>>;

pub fn run_station(engine: Arc<AttendanceEngine>, slot: SlotArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(station_loop(engine, slot))
}

async fn station_loop(engine: Arc<AttendanceEngine>, slot: SlotArgs) -> Result<()> {
    let event_id = EventId::new(slot.event);
    if engine.policy().get_event(&event_id).is_none() {
        return Err(RollcallError::EventNotFound(event_id).into());
    }

    engine
        .store()
        .append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

    let sequencer = Arc::new(ScanSequencer::new());
    let mut pending: JoinSet<ScanResult> = JoinSet::new();

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!(
        event_id = %event_id,
        session = %slot.session,
        direction = %slot.direction,
        "Station running"
    );
    println!(
        "Scanning {} {} {}; Ctrl-C to stop",
        event_id, slot.session, slot.direction
    );

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully");
                break;
            }

            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let tag = line.trim();
                        if tag.is_empty() {
                            continue;
                        }

                        let request = ScanRequest::new(
                            ScanIdentity::Rfid(tag.to_string()),
                            event_id.clone(),
                            slot.session,
                            slot.direction,
                            rollcall_util::now(),
                        );
                        let ticket = sequencer.admit(request);
                        debug!(ticket = ticket.number(), tag, "Scan queued");
                        let engine = Arc::clone(&engine);
                        let sequencer = Arc::clone(&sequencer);
                        pending.spawn_blocking(move || {
                            sequencer.process(ticket, |request| engine.scan(request))
                        });
                    }
                    Ok(None) => {
                        info!("Scan input closed");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to read scan input");
                        break;
                    }
                }
            }

            Some(joined) = pending.join_next() => report(joined),
        }
    }

    // Admitted scans are still applied
    while let Some(joined) = pending.join_next().await {
        report(joined);
    }

    let recent = engine.recent_activity(SHUTDOWN_ACTIVITY_COUNT);
    if !recent.is_empty() {
        println!();
        println!("Recent activity:");
        for transaction in recent {
            println!(
                "  {}  {:<16} {:<12} ₱{:.2}",
                transaction.date,
                transaction.kind.label(),
                transaction.student_id,
                transaction.amount
            );
        }
    }

    if let Err(e) = engine
        .store()
        .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
    {
        warn!(error = %e, "Failed to log station shutdown");
    }

    info!("Station stopped");
    Ok(())
}

fn report(joined: std::result::Result<ScanResult, JoinError>) {
    match joined {
        Ok(Some(Ok(outcome))) => println!("{}", describe_outcome(&outcome)),
        Ok(Some(Err(e))) => println!("Rejected: {}", e),
        Ok(None) => warn!("Scan left the queue before it was processed"),
        Err(e) => error!(error = %e, "Scan task failed"),
    }
}

/// One-line summary of an accepted scan
pub fn describe_outcome(outcome: &ScanOutcome) -> String {
    let mut line = format!(
        "{} ({}): {}",
        outcome.student.full_name(),
        outcome.student.id,
        outcome.record.status
    );
    if outcome.record.status == AttendanceStatus::Late {
        line.push_str(&format!(", {} min", outcome.record.minutes_late));
    }
    if let Some(fine) = &outcome.fine {
        line.push_str(&format!(", fined ₱{:.2}", fine.amount));
    }
    line
}
