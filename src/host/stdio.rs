//! Stdin/stdout JSON bridge for the host command channel.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages from stdin,
//! dispatches them through the `HostCommandServer` router, and writes
//! `ResponseEnvelope` and `EventEnvelope` messages as newline-delimited
//! JSON to stdout.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::config::HostConfig;
use crate::error::{AlarmError, Result};
use crate::host::channel::{
    HostCommandClient, command_channel, forward_notifications, forward_reminder_events,
};
use crate::host::contract::{CommandEnvelope, CommandName, ResponseEnvelope};
use crate::scheduler::presenter::Notification;
use crate::scheduler::service::SchedulerHandle;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, mpsc, oneshot};

type SharedWriter<W> = Arc<Mutex<BufWriter<W>>>;

/// Run the bridge on the process's stdin/stdout.
pub async fn run_stdio_bridge(
    scheduler: SchedulerHandle,
    notifications: mpsc::UnboundedReceiver<Notification>,
    config: &HostConfig,
) -> Result<()> {
    run_bridge(
        tokio::io::stdin(),
        tokio::io::stdout(),
        scheduler,
        notifications,
        config,
    )
    .await
}

/// Run the JSON bridge until input closes or `runtime.stop` is received.
///
/// Alongside the reader, three tasks run: the command router, a forwarder
/// turning scheduler events into `reminder.*` event envelopes, and one
/// turning presenter notifications into `notification.show` envelopes. A
/// writer task serialises every envelope onto the output.
pub async fn run_bridge<R, W>(
    input: R,
    output: W,
    scheduler: SchedulerHandle,
    notifications: mpsc::UnboundedReceiver<Notification>,
    config: &HostConfig,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let reminder_events = scheduler.subscribe();
    let (client, server) =
        command_channel(config.request_capacity, config.event_capacity, scheduler);
    let writer: SharedWriter<W> = Arc::new(Mutex::new(BufWriter::new(output)));

    let server_handle = tokio::spawn(server.run());

    let event_writer = Arc::clone(&writer);
    let mut event_rx = client.subscribe_events();
    let event_handle = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event_envelope) => match serde_json::to_string(&event_envelope) {
                    Ok(json) => {
                        let mut w = event_writer.lock().await;
                        if let Err(e) = write_line(&mut w, &json).await {
                            tracing::warn!(
                                error = %e,
                                "failed to write event envelope; stopping event writer"
                            );
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize event envelope; skipping");
                    }
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event writer lagged; some events were dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    tracing::info!("event broadcast channel closed; stopping event writer");
                    break;
                }
            }
        }
    });

    let (reminder_stop_tx, reminder_stop_rx) = oneshot::channel();
    let reminder_forwarder = tokio::spawn(forward_reminder_events(
        reminder_events,
        client.event_sender(),
        reminder_stop_rx,
    ));
    let (notification_stop_tx, notification_stop_rx) = oneshot::channel();
    let notification_forwarder = tokio::spawn(forward_notifications(
        notifications,
        client.event_sender(),
        notification_stop_rx,
    ));

    // Consumes the client, so its request and event senders drop here.
    let reader_result = run_reader(input, client, Arc::clone(&writer)).await;

    let _ = reminder_stop_tx.send(());
    let _ = notification_stop_tx.send(());
    let _ = reminder_forwarder.await;
    let _ = notification_forwarder.await;
    // Every event sender is gone once the server exits, so the writer
    // flushes what is buffered and then sees the broadcast close.
    let _ = server_handle.await;
    let _ = event_handle.await;

    reader_result
}

async fn run_reader<R, W>(input: R, client: HostCommandClient, writer: SharedWriter<W>) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(input);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| AlarmError::Channel(format!("failed to read command input: {e}")))?;

        if bytes_read == 0 {
            tracing::info!("command input closed (EOF); shutting down bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: CommandEnvelope = match serde_json::from_str(trimmed) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(error = %e, raw_line = %trimmed, "failed to parse command envelope");
                let error_response = ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                );
                write_response(&writer, &error_response).await?;
                continue;
            }
        };

        let is_stop = envelope.command == CommandName::RuntimeStop;
        let request_id = envelope.request_id.clone();

        let response = match client.send(envelope).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(error = %e, "host command dispatch failed");
                ResponseEnvelope::error(request_id, format!("dispatch failed: {e}"))
            }
        };
        write_response(&writer, &response).await?;

        if is_stop {
            tracing::info!("runtime.stop received; shutting down bridge");
            break;
        }
    }

    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &SharedWriter<W>,
    response: &ResponseEnvelope,
) -> Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| AlarmError::Contract(format!("failed to serialize response envelope: {e}")))?;
    let mut w = writer.lock().await;
    write_line(&mut w, &json).await
}

/// Write a single JSON line and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| AlarmError::Channel(format!("failed to write output: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| AlarmError::Channel(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| AlarmError::Channel(format!("failed to flush output: {e}")))?;
    Ok(())
}
