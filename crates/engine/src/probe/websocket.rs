use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::PongTiming;
use crate::error::{ErrorKind, ProbeError};

const PING_PAYLOAD: &[u8] = b"uppe-keepalive";

fn socket_error(err: WsError) -> ProbeError {
    match &err {
        WsError::Io(io) => ProbeError::classify(io),
        WsError::Tls(_) => ProbeError::new(ErrorKind::TlsFailure, err.to_string()),
        _ => ProbeError::classify(&err),
    }
}

/// Open a socket, send one ping and time the matching pong.
///
/// The pong must arrive within `max_pong_delay` and within what is left of
/// `timeout` after connecting; otherwise the probe fails with a timeout.
pub async fn pong_delay(url: &str, max_pong_delay: Duration, timeout: Duration) -> Result<PongTiming, ProbeError> {
    let start = Instant::now();

    let (mut socket, _) = tokio::time::timeout(timeout, connect_async(url))
        .await
        .map_err(|_| ProbeError::timeout(format!("no handshake from {url} within {}ms", timeout.as_millis())))?
        .map_err(socket_error)?;

    let wait = max_pong_delay.min(timeout.saturating_sub(start.elapsed()));
    let sent = Instant::now();
    let exchange = async {
        socket.send(Message::Ping(PING_PAYLOAD.to_vec())).await.map_err(socket_error)?;
        loop {
            match socket.next().await {
                Some(Ok(Message::Pong(payload))) if payload == PING_PAYLOAD => break,
                Some(Ok(Message::Close(_))) | None => {
                    return Err(ProbeError::new(ErrorKind::Other, "socket closed before pong"));
                }
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(socket_error(err)),
            }
        }
        Ok::<_, ProbeError>(())
    };

    tokio::time::timeout(wait, exchange)
        .await
        .map_err(|_| ProbeError::timeout(format!("no pong from {url} within {}ms", wait.as_millis())))??;
    let pong_delay_ms = sent.elapsed().as_millis() as u64;

    // Best effort; the measurement is already taken
    let _ = socket.close(None).await;

    Ok(PongTiming { pong_delay_ms, latency_ms: start.elapsed().as_millis() as u64 })
}
