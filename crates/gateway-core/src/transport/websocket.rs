//! Websocket control channel
//!
//! Opens the connection with the gateway's subprotocol, then splits it into a
//! writer task that drains the outbound queue and a reader task that forwards text
//! frames. Whichever side notices the socket die first reports
//! [`TransportEvent::Closed`].

use futures::{Sink, SinkExt, Stream, StreamExt};
use http::HeaderValue;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest, protocol::Message};
use tracing::{debug, info, trace, warn};

use super::{Connection, OutboundFrame, TransportChannels, TransportEvent};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};

/// Open the control channel described by `config`
///
/// Fails with [`GatewayError::ConnectTimeout`] when the handshake does not complete
/// within `connect_timeout_secs`, and with [`GatewayError::Connect`] when the URL is
/// unusable or the gateway rejects the upgrade.
pub async fn connect(config: &GatewayConfig) -> GatewayResult<TransportChannels> {
    let endpoint = config.url.clone();
    let connect_error = |reason: String| GatewayError::Connect {
        endpoint: endpoint.clone(),
        reason,
    };

    let mut request = endpoint
        .as_str()
        .into_client_request()
        .map_err(|e| connect_error(e.to_string()))?;
    let protocol = HeaderValue::from_str(&config.subprotocol)
        .map_err(|e| connect_error(format!("invalid subprotocol: {}", e)))?;
    request
        .headers_mut()
        .insert(http::header::SEC_WEBSOCKET_PROTOCOL, protocol);

    debug!(endpoint = %endpoint, subprotocol = %config.subprotocol, "Connecting to gateway");

    let (stream, response) = match tokio::time::timeout(config.connect_timeout(), connect_async(request)).await {
        Err(_) => {
            warn!(endpoint = %endpoint, "Gateway handshake timed out");
            return Err(GatewayError::ConnectTimeout {
                endpoint: endpoint.clone(),
                seconds: config.connect_timeout_secs,
            });
        }
        Ok(Err(e)) => {
            warn!(endpoint = %endpoint, error = %e, "Gateway handshake failed");
            return Err(connect_error(e.to_string()));
        }
        Ok(Ok(pair)) => pair,
    };

    info!(endpoint = %endpoint, status = %response.status(), "Control channel established");

    let (sink, stream) = stream.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    tokio::spawn(write_loop(sink, outbound_rx, inbound_tx.clone()));
    tokio::spawn(read_loop(stream, inbound_tx));

    Ok(TransportChannels {
        connection: Connection::new(outbound_tx),
        inbound: inbound_rx,
    })
}

async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    events: mpsc::UnboundedSender<TransportEvent>,
) where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        match frame {
            OutboundFrame::Text(text) => {
                trace!(bytes = text.len(), "Sending frame");
                if let Err(e) = sink.send(Message::text(text)).await {
                    warn!(error = %e, "Failed to write to control channel");
                    let _ = events.send(TransportEvent::Closed {
                        reason: e.to_string(),
                    });
                    return;
                }
            }
            OutboundFrame::Close => break,
        }
    }

    if let Err(e) = sink.send(Message::Close(None)).await {
        debug!(error = %e, "Close frame not delivered");
    }
    let _ = sink.close().await;
}

async fn read_loop<S>(mut stream: S, events: mpsc::UnboundedSender<TransportEvent>)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                trace!(bytes = text.len(), "Received frame");
                if events.send(TransportEvent::Frame(text.as_str().to_owned())).is_err() {
                    return;
                }
            }
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                Ok(text) => {
                    if events.send(TransportEvent::Frame(text)).is_err() {
                        return;
                    }
                }
                Err(_) => warn!(bytes = data.len(), "Dropping non UTF-8 binary frame"),
            },
            Some(Ok(Message::Close(frame))) => {
                break frame
                    .map(|f| f.reason.as_str().to_owned())
                    .filter(|reason| !reason.is_empty())
                    .unwrap_or_else(|| "closed by gateway".to_string());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break e.to_string(),
            None => break "connection closed".to_string(),
        }
    };

    debug!(reason = %reason, "Control channel reader finished");
    let _ = events.send(TransportEvent::Closed { reason });
}
