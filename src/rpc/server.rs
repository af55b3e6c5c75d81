//! The RPC server thread and the bounded request queue
//!
//! One background thread owns the transport accept/read loop. Each parsed
//! and validated request is pushed onto a bounded queue together with a
//! one-shot reply channel; the simulation thread drains the queue at tick
//! boundaries in FIFO order and replies through the channel. A reply that
//! does not arrive within the deadline is answered with an ExecutionFailed
//! error so the client never hangs on a shutting-down simulator.

use crate::error::{Error, Result};
use crate::rpc::protocol::{validate, Request, Response};
use crate::rpc::transport::{is_timeout, TcpTransport, Transport};
use crate::simulation::simulator::Simulator;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Default reply deadline for one request
pub const REPLY_DEADLINE: Duration = Duration::from_secs(1);

/// Capacity of the inbound request queue
const QUEUE_CAPACITY: usize = 64;

/// A request waiting to be applied by the simulation thread
pub struct PendingRequest {
    pub request: Request,
    pub reply: Sender<Response>,
}

/// Create the bounded queue connecting the server thread to the simulation
/// thread
pub fn request_channel() -> (Sender<PendingRequest>, Receiver<PendingRequest>) {
    bounded(QUEUE_CAPACITY)
}

/// Drain all queued requests in FIFO order and apply them to the simulator.
/// Called by the simulation thread at the start of each tick.
pub fn drain(queue: &Receiver<PendingRequest>, simulator: &mut Simulator) {
    while let Ok(pending) = queue.try_recv() {
        tracing::debug!(method = %pending.request.method, "rpc request applied");
        let response = crate::rpc::protocol::dispatch(simulator, &pending.request);
        let _ = pending.reply.send(response);
    }
}

/// Handle of the background RPC server thread
pub struct RpcServer {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl RpcServer {
    /// Bind a TCP listener and serve connections on a background thread
    pub fn spawn_tcp(port: u16, queue: Sender<PendingRequest>) -> Result<RpcServer> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .map_err(|e| Error::rpc(format!("cannot bind port {}: {}", port, e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| Error::rpc(format!("cannot configure listener: {}", e)))?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);
        let handle = std::thread::spawn(move || {
            tracing::info!(port, "rpc server listening");
            while !thread_shutdown.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, peer)) => {
                        tracing::info!(%peer, "rpc client connected");
                        match TcpTransport::from_stream(stream) {
                            Ok(transport) => {
                                serve(Box::new(transport), &queue, &thread_shutdown);
                            }
                            Err(e) => tracing::warn!(error = %e, "rpc connection setup failed"),
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(10));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "rpc accept failed");
                        std::thread::sleep(Duration::from_millis(100));
                    }
                }
            }
        });
        Ok(RpcServer {
            handle: Some(handle),
            shutdown,
        })
    }

    /// Serve a single pre-connected transport on a background thread (used
    /// with [`ChannelTransport`](crate::rpc::transport::ChannelTransport)
    /// pairs in tests)
    pub fn spawn_with_transport(
        transport: Box<dyn Transport>,
        queue: Sender<PendingRequest>,
    ) -> RpcServer {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);
        let handle = std::thread::spawn(move || {
            serve(transport, &queue, &thread_shutdown);
        });
        RpcServer {
            handle: Some(handle),
            shutdown,
        }
    }

    /// Signal the server thread to exit and join it
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve(mut transport: Box<dyn Transport>, queue: &Sender<PendingRequest>, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Relaxed) {
        let line = match transport.receive() {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("rpc client disconnected");
                return;
            }
            Err(e) if is_timeout(&e) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "rpc receive failed");
                return;
            }
        };
        let response = handle_line(&line, queue);
        let serialized = serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"error":{"message":"serialization failed"}}"#.to_string());
        if let Err(e) = transport.send(&serialized) {
            tracing::warn!(error = %e, "rpc send failed");
            return;
        }
    }
}

fn handle_line(line: &str, queue: &Sender<PendingRequest>) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return Response::error(format!("malformed request: {}", e)),
    };
    if let Err(response) = validate(&request) {
        return response;
    }
    let (reply_tx, reply_rx) = bounded(1);
    if queue
        .send_timeout(
            PendingRequest {
                request,
                reply: reply_tx,
            },
            REPLY_DEADLINE,
        )
        .is_err()
    {
        return Response::error("ExecutionFailed: simulator queue unavailable");
    }
    match reply_rx.recv_timeout(REPLY_DEADLINE) {
        Ok(response) => response,
        Err(_) => Response::error("ExecutionFailed: request deadline exceeded"),
    }
}
