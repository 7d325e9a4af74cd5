use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpStream, select, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, warn};

use crate::auth::{AuthContext, Authenticator, credential_from};
use crate::errors::WireError;
use crate::gateway::{GatewayHandle, GatewayMessage, Outbound};
use crate::shared_types::ParticipantId;
use crate::wire;

// -----------------------------------------------------------------------------
// ----- Connection serials ----------------------------------------------------

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

// -----------------------------------------------------------------------------
// ----- FrontendConnection ----------------------------------------------------

/// One client socket. Parses frames into gateway commands and writes whatever
/// the gateway queues for it; holds no session state of its own.
pub struct FrontendConnection {
    peer: SocketAddr,
    participant: ParticipantId,
    serial: u64,
    auth: Option<AuthContext>,

    ws: WsStream,
    gateway: GatewayHandle,
}

// -----------------------------------------------------------------------------
// ----- FrontendConnection: Static --------------------------------------------

impl FrontendConnection {
    /// Completes the WebSocket handshake and resolves the connection's
    /// identity from its credential, if it brought one.
    pub async fn accept(
        stream: TcpStream,
        peer: SocketAddr,
        gateway: GatewayHandle,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<FrontendConnection, tungstenite::Error> {
        let mut credential = None;

        let ws = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &Request, res: Response| -> Result<Response, ErrorResponse> {
                let authorization = req
                    .headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok());

                credential = credential_from(authorization, req.uri().query());
                Ok(res)
            },
        )
        .await?;

        let auth = credential.and_then(|c| authenticator.authenticate(&c));
        if auth.is_none() {
            debug!("client {peer} connected anonymously");
        }

        let participant = auth
            .as_ref()
            .map(|a| a.participant.clone())
            .unwrap_or_else(ParticipantId::random);

        Ok(Self {
            peer,
            participant,
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            auth,
            ws,
            gateway,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- FrontendConnection: Public --------------------------------------------

impl FrontendConnection {
    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    /// Runs until the client goes away or the gateway closes the connection.
    /// Always reports the disconnect, whatever ended the loop.
    pub async fn serve(self) -> Result<(), tungstenite::Error> {
        let Self {
            peer,
            participant,
            serial,
            auth,
            ws,
            gateway,
        } = self;

        let (writer, mut reader) = ws.split();
        let (outbox, outbox_rx) = mpsc::unbounded_channel::<Outbound>();
        let mut writer_task = spawn_writer_task(writer, outbox_rx);

        let registered = gateway.send(GatewayMessage::Connected {
            participant: participant.clone(),
            serial,
            outbox,
            auth,
        });

        let session = ClientSession {
            peer,
            participant,
            serial,
            gateway,
        };

        let result = if registered {
            session.read_loop(&mut reader, &mut writer_task).await
        } else {
            warn!("gateway is gone; dropping client {peer}");
            Ok(())
        };

        session.gateway.send(GatewayMessage::Disconnected {
            participant: session.participant.clone(),
            serial: session.serial,
        });

        writer_task.abort();
        result
    }
}

// -----------------------------------------------------------------------------
// ----- ClientSession ---------------------------------------------------------

/// The identity half of a connection once its socket has been split.
struct ClientSession {
    peer: SocketAddr,
    participant: ParticipantId,
    serial: u64,
    gateway: GatewayHandle,
}

impl ClientSession {
    async fn read_loop(
        &self,
        reader: &mut SplitStream<WsStream>,
        writer_task: &mut JoinHandle<()>,
    ) -> Result<(), tungstenite::Error> {
        loop {
            select! {

                // -- Client frames --
                next = reader.next() => {
                    let Some(frame) = next else { break };

                    match frame? {
                        Message::Text(text) => self.process_text(text.as_str()),
                        Message::Binary(_) => {
                            debug!("client {}: {}", self.peer, WireError::Binary);
                        }
                        Message::Close(_) => break,
                        // Pings are answered by tungstenite itself.
                        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                    }
                }

                // -- Writer finished (close sent or socket dead) --
                _ = &mut *writer_task => break,
            }
        }

        Ok(())
    }

    fn process_text(&self, text: &str) {
        let inbound = match wire::decode(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                debug!("client {} sent an unusable frame: {e}", self.peer);
                return;
            }
        };

        self.gateway.send(GatewayMessage::Command {
            participant: self.participant.clone(),
            serial: self.serial,
            inbound,
        });
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn spawn_writer_task(
    mut writer: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        'outer: while let Some(frame) = rx.recv().await {
            let mut closing = false;

            if !feed(&mut writer, frame, &mut closing).await {
                break;
            }

            // coalesce bursts into one flush
            while !closing {
                let Ok(more) = rx.try_recv() else { break };
                if !feed(&mut writer, more, &mut closing).await {
                    break 'outer;
                }
            }

            if writer.flush().await.is_err() || closing {
                break;
            }
        }

        let _ = writer.close().await;
    })
}

/// Queues one frame without flushing. Returns false once the socket is dead.
async fn feed(
    writer: &mut SplitSink<WsStream, Message>,
    frame: Outbound,
    closing: &mut bool,
) -> bool {
    let message = match frame {
        Outbound::Text(text) => Message::Text(text.into()),
        Outbound::Close => {
            *closing = true;
            Message::Close(None)
        }
    };

    writer.feed(message).await.is_ok()
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
