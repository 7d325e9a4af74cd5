use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket};
use tracing::{debug, error, info};

use crate::auth::Authenticator;
use crate::frontend::FrontendConnection;
use crate::gateway::GatewayHandle;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const LISTEN_BACKLOG: u32 = 1024;

// -----------------------------------------------------------------------------
// ----- Server ----------------------------------------------------------------

/// Accepts sockets and hands each one to its own `FrontendConnection` task.
pub struct Server {
    listener: TcpListener,
    gateway: GatewayHandle,
    authenticator: Arc<dyn Authenticator>,
}

// -----------------------------------------------------------------------------
// ----- Server: Static --------------------------------------------------------

impl Server {
    pub fn bind(
        addr: SocketAddr,
        gateway: GatewayHandle,
        authenticator: Arc<dyn Authenticator>,
    ) -> std::io::Result<Server> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;

        let listener = socket.listen(LISTEN_BACKLOG)?;
        Ok(Self::from_listener(listener, gateway, authenticator))
    }

    pub fn from_listener(
        listener: TcpListener,
        gateway: GatewayHandle,
        authenticator: Arc<dyn Authenticator>,
    ) -> Server {
        Self {
            listener,
            gateway,
            authenticator,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Server: Public --------------------------------------------------------

impl Server {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts until `shutdown` resolves. Connections already running are
    /// left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("listener on {} shutting down", self.local_addr()?);
                    break;
                }

                accept_res = self.listener.accept() => {
                    let (stream, peer) = match accept_res {
                        Ok(v) => v,
                        Err(e) => { error!("accept error: {e}"); continue; }
                    };

                    let _ = stream.set_nodelay(true);

                    let gateway = self.gateway.clone();
                    let authenticator = self.authenticator.clone();

                    tokio::spawn(async move {
                        let conn = match FrontendConnection::accept(stream, peer, gateway, authenticator).await {
                            Ok(conn) => conn,
                            Err(e) => { debug!("handshake with {peer} failed: {e}"); return; }
                        };

                        debug!("client {peer} is {}", conn.participant());

                        if let Err(e) = conn.serve().await {
                            error!("client {peer} error: {e}");
                        }
                    });
                }
            }
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
