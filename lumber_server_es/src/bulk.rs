use std::io;
use std::time::Duration;

use async_compression::Level;
use async_compression::tokio::bufread::GzipDecoder;
use async_compression::tokio::write::GzipEncoder;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::{AppendHeaders, IntoResponse, Response};
use futures::{StreamExt, TryStreamExt};
use lumber_core::{Batch, BatchSender, Event};
use lumber_server_http::body::response_channel;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

use crate::EsState;

/// Sub-batch groups in flight between the decode loop and the drain
/// task. Bounds how far decoding runs ahead of acknowledgment.
const GROUP_LOOKAHEAD: usize = 2;

const ITEM_FIRST: &[u8] = b"{\"created\":{\"status\":200}}";
const ITEM_NEXT: &[u8] = b",{\"created\":{\"status\":200}}";

type BulkReader = Box<dyn AsyncBufRead + Send + Unpin>;
type BulkWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Handler for `HEAD /`: liveness probe.
pub(crate) async fn ping_handler() -> StatusCode {
    StatusCode::OK
}

/// Handler for `POST /` and `POST /_bulk`.
///
/// The response begins streaming before any event is processed; after
/// the 200 status line and the opening bracket are on the wire no
/// distinct error status can follow, so a mid-stream decode failure
/// only truncates the item list while the array is still closed
/// validly.
pub(crate) async fn bulk_handler(State(state): State<EsState>, request: Request) -> Response {
    let gzip_in = request
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == "gzip");
    let gzip_out = request
        .headers()
        .get(header::ACCEPT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("gzip"));

    let stream = request
        .into_body()
        .into_data_stream()
        .map_err(io::Error::other)
        .boxed();
    let raw = StreamReader::new(stream);
    let reader: BulkReader = if gzip_in {
        let mut decoder = BufReader::new(GzipDecoder::new(raw));
        // Validate the gzip header before committing a status code;
        // once the 200 is on the wire no error status can follow.
        if let Err(err) = decoder.fill_buf().await.map(drop) {
            debug!(error = %err, "invalid gzip payload");
            return StatusCode::BAD_REQUEST.into_response();
        }
        Box::new(decoder)
    } else {
        Box::new(raw)
    };

    let (response_writer, response_body) = response_channel();
    let writer: BulkWriter = if gzip_out {
        // Same compression level the reference implementation uses.
        Box::new(GzipEncoder::with_quality(response_writer, Level::Precise(3)))
    } else {
        Box::new(response_writer)
    };

    tokio::spawn(stream_bulk(state, reader, writer));

    let mut headers = vec![(header::CONTENT_TYPE.as_str(), "application/json")];
    if gzip_out {
        headers.push((header::CONTENT_ENCODING.as_str(), "gzip"));
    }

    (StatusCode::OK, AppendHeaders(headers), response_body).into_response()
}

/// Decode the NDJSON payload into sub-batches while the drain task
/// acknowledges them into the streamed response in formation order.
async fn stream_bulk(state: EsState, reader: BulkReader, mut writer: BulkWriter) {
    if writer.write_all(b"{\"items\": [").await.is_err() {
        return;
    }
    let _ = writer.flush().await;

    let (group_tx, group_rx) = mpsc::channel(GROUP_LOOKAHEAD);
    let drain = tokio::spawn(drain_groups(
        group_rx,
        state.channel.clone(),
        writer,
        state.silent,
    ));

    let mut lines = reader.lines();
    let mut events: Vec<Event> = Vec::with_capacity(state.split);
    loop {
        let Some(meta) = next_json_line(&mut lines, state.timeout).await else {
            break;
        };
        let Some(mut event) = next_json_line(&mut lines, state.timeout).await else {
            break;
        };
        match event {
            Value::Object(ref mut fields) => {
                fields.insert("@metadata".to_string(), meta);
            }
            _ => break,
        }

        events.push(event);
        if events.len() == state.split {
            let group = std::mem::replace(&mut events, Vec::with_capacity(state.split));
            if group_tx.send(Batch::new(group)).await.is_err() {
                break;
            }
        }
    }

    // Residual partial group: flushed even when the decode loop ended
    // on an error, so no accepted events are silently dropped.
    if !events.is_empty() {
        let _ = group_tx.send(Batch::new(events)).await;
    }
    drop(group_tx);

    match drain.await {
        Ok(mut writer) => {
            let _ = writer.write_all(b"]}").await;
            let _ = writer.shutdown().await;
        }
        Err(err) => warn!(error = %err, "acknowledgment pipeline failed"),
    }
}

/// The single ordered drain task: sole writer of per-item statuses,
/// consuming sub-batches strictly in formation order regardless of the
/// order in which their gates close.
async fn drain_groups(
    mut groups: mpsc::Receiver<Batch>,
    channel: BatchSender,
    mut writer: BulkWriter,
    silent: bool,
) -> BulkWriter {
    let mut first = true;
    while let Some(batch) = groups.recv().await {
        let events = batch.len();
        let gate = batch.gate();

        if channel.send(batch).await.is_err() {
            warn!("ingestion channel closed, dropping remaining bulk groups");
            break;
        }

        gate.acked().await;
        if silent {
            continue;
        }

        for _ in 0..events {
            let item = if first {
                first = false;
                ITEM_FIRST
            } else {
                ITEM_NEXT
            };
            let _ = writer.write_all(item).await;
        }
        let _ = writer.flush().await;
    }

    writer
}

/// Next non-blank line parsed as JSON; `None` on end of input, a read
/// exceeding `timeout`, or any decode failure, each of which
/// terminates the caller's loop early.
async fn next_json_line(lines: &mut Lines<BulkReader>, timeout: Duration) -> Option<Value> {
    loop {
        let read = if timeout.is_zero() {
            lines.next_line().await
        } else {
            match tokio::time::timeout(timeout, lines.next_line()).await {
                Ok(read) => read,
                Err(_) => {
                    debug!("bulk payload read timed out");
                    return None;
                }
            }
        };
        match read {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str(trimmed) {
                    Ok(value) => return Some(value),
                    Err(err) => {
                        debug!(error = %err, "malformed bulk line");
                        return None;
                    }
                }
            }
            Ok(None) => return None,
            Err(err) => {
                debug!(error = %err, "failed reading bulk payload");
                return None;
            }
        }
    }
}
