//! TCP front end: one driver session per connection.

use crate::controller::Simulator;
use crate::session::Session;
use crate::wire::{ErrorCode, Request, Response, ServiceDescriptor};
use dposim_env::HarnessContext;
use futures::StreamExt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

/// Longest request line accepted from a driver, newline excluded.
pub const MAX_REQUEST_BYTES: usize = 1 << 20;

/// Serves the line protocol in `wire` for one simulator.
pub struct SimServer<C: HarnessContext> {
    listener: TcpListener,
    simulator: Arc<Simulator<C>>,
}

impl<C: HarnessContext> SimServer<C> {
    pub async fn bind<A: ToSocketAddrs>(addr: A, simulator: Arc<Simulator<C>>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            simulator,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts drivers until the listener fails.
    pub async fn serve(self) -> io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let simulator = self.simulator.clone();
            self.simulator.context().spawn(
                &format!("driver-{}", peer),
                handle_connection(stream, peer, simulator),
            );
        }
    }
}

async fn handle_connection<C: HarnessContext>(
    stream: TcpStream,
    peer: SocketAddr,
    simulator: Arc<Simulator<C>>,
) {
    let (reader, writer) = stream.into_split();
    let (session, responses) = Session::open();
    info!(%peer, session = session.id(), "Driver connected");

    let (close_tx, close_rx) = oneshot::channel();
    let writer_task = tokio::spawn(write_responses(writer, responses, close_rx));

    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_REQUEST_BYTES));
    while let Some(next) = lines.next().await {
        match next {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => {
                let response = dispatch(&simulator, &session, &line).await;
                session.send(response);
            }
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!(%peer, limit = MAX_REQUEST_BYTES, "Request line too long, closing");
                session.send(Response::error(
                    ErrorCode::BadRequest,
                    format!("request line exceeds {} bytes", MAX_REQUEST_BYTES),
                ));
                break;
            }
            Err(LinesCodecError::Io(e)) => {
                warn!(%peer, error = %e, "Read failed");
                break;
            }
        }
    }

    let _ = close_tx.send(());
    let _ = writer_task.await;
    info!(%peer, session = session.id(), "Driver disconnected");
}

/// Writes responses as lines. On close, flushes what is queued and stops;
/// the session itself may stay bound to players after the driver leaves.
async fn write_responses(
    mut writer: OwnedWriteHalf,
    mut responses: mpsc::UnboundedReceiver<Response>,
    mut close: oneshot::Receiver<()>,
) {
    loop {
        let response = tokio::select! {
            biased;
            Some(response) = responses.recv() => response,
            _ = &mut close => break,
        };
        if write_line(&mut writer, &response).await.is_err() {
            return;
        }
    }
    while let Ok(response) = responses.try_recv() {
        if write_line(&mut writer, &response).await.is_err() {
            return;
        }
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, response: &Response) -> io::Result<()> {
    let mut line = response
        .to_line()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await
}

async fn dispatch<C: HarnessContext>(
    simulator: &Simulator<C>,
    session: &Session,
    line: &str,
) -> Response {
    let request = match Request::parse(line) {
        Ok(request) => request,
        Err(e) => {
            debug!(session = session.id(), error = %e, "Bad request");
            return Response::error(ErrorCode::BadRequest, e);
        }
    };

    match request {
        Request::Init { n_players } => match simulator.init(n_players).await {
            Ok(_) => Response::Empty,
            Err(e) => Response::init_failed(&e),
        },
        Request::Inject {
            player_id,
            internal_msg_type,
            value,
        } => match simulator
            .inject(player_id, internal_msg_type, &value, session)
            .await
        {
            Ok(report) => Response::done(&report),
            Err(e) => {
                warn!(player_id, session = session.id(), error = %e, "Inject failed");
                Response::inject_failed(&e)
            }
        },
        Request::Describe => Response::Service(ServiceDescriptor::current()),
    }
}
