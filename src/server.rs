//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** (what Kubernetes and most process supervisors send) or
//! **Ctrl-C** the server:
//!
//! 1. Stops calling `listener.accept()`, so no new connections are made.
//! 2. Tells every open connection to shut down. Idle keep-alive connections
//!    close at once; a connection with a request in flight closes once that
//!    response has been written.
//! 3. Waits up to the drain timeout (30 s unless changed with
//!    [`Server::drain_timeout`]) and aborts whatever is still running.
//! 4. Returns from [`Server::serve`], which lets `main` exit cleanly.
//!
//! Keep the drain timeout below your supervisor's grace period (for
//! Kubernetes, `terminationGracePeriodSeconds`), or the process is killed
//! before the drain finishes.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::request::Request;
use crate::response::{HyperBody, Response};
use crate::router::Router;

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    drain_timeout: Duration,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// An address that is not `host:port` is [`Error::InvalidArgument`].
    ///
    /// ```rust
    /// use tsu_page::Server;
    /// let server = Server::bind("0.0.0.0:3000").unwrap();
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr
            .parse()
            .map_err(|e| Error::InvalidArgument(format!("socket address `{addr}`: {e}")))?;
        Ok(Self { addr, drain_timeout: DEFAULT_DRAIN_TIMEOUT })
    }

    /// How long shutdown waits for in-flight requests before aborting them.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Accepts connections and dispatches them through `router`.
    ///
    /// Returns only after a full graceful shutdown: SIGTERM or Ctrl-C,
    /// followed by every connection closing or the drain timeout expiring.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but shuts down when `signal` resolves
    /// instead of on a process signal. Useful for tests and for embedding.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %listener.local_addr()?, "tsu-page listening");
        run(listener, router, signal, self.drain_timeout).await
    }
}

/// The accept loop, split out so it can run on an already-bound listener.
async fn run(
    listener: TcpListener,
    router: Router,
    signal: impl Future<Output = ()>,
    drain_timeout: Duration,
) -> Result<(), Error> {
    // One routing table shared by every connection task.
    let router = Arc::new(router);

    // `auto::Builder` serves HTTP/1.1 and HTTP/2, whichever the client
    // negotiates. It is built once; each connection takes an owned copy.
    let builder = ConnBuilder::new(TokioExecutor::new());

    // Every connection is registered with the watcher so it can be told to
    // shut down. Without this an idle keep-alive connection never finishes
    // and the drain below waits forever.
    let graceful = GracefulShutdown::new();

    // Spawned connection tasks, so the drain can abort stragglers.
    let mut tasks = tokio::task::JoinSet::new();

    // `select!` polls the signal by reference on every iteration, and a
    // future must not move once polled. `tokio::pin!` pins it on the stack.
    tokio::pin!(signal);

    loop {
        tokio::select! {
            // `biased` checks the arms top to bottom instead of at random,
            // so a signal stops accepting even while connections are queued.
            biased;

            () = &mut signal => {
                info!(open = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let router = Arc::clone(&router);
                // `service_fn` is called once per request on the connection,
                // not once per connection.
                let svc = service_fn(move |req| {
                    let router = Arc::clone(&router);
                    async move { dispatch(&router, req).await }
                });

                // TokioIo adapts tokio's AsyncRead/AsyncWrite to hyper's IO traits.
                let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tasks.spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer = %remote_addr, "connection error: {e}");
                    }
                });
            }

            // Reap finished connection tasks so the JoinSet does not grow
            // without bound on long-running servers.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    drop(listener);

    match tokio::time::timeout(drain_timeout, graceful.shutdown()).await {
        Ok(()) => debug!("all connections closed"),
        Err(_) => {
            warn!(open = tasks.len(), ?drain_timeout, "drain timed out, aborting connections");
            tasks.abort_all();
        }
    }
    while tasks.join_next().await.is_some() {}

    info!("tsu-page stopped");
    Ok(())
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Core hot path: routes one request and produces one response.
///
/// The error type is [`Infallible`]. Every failure (no route, unreadable body,
/// a handler error) is already a status response by the time it gets here, so
/// hyper never sees an error.
async fn dispatch(
    router: &Router,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<HyperBody>, Infallible> {
    let (parts, body) = req.into_parts();

    let Some((handler, params)) = router.lookup(&parts.method, parts.uri.path()) else {
        debug!(method = %parts.method, path = parts.uri.path(), "no route");
        return Ok(Response::status(StatusCode::NOT_FOUND).into_inner());
    };

    // Handlers see the whole body; form decoding needs it in one piece.
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(path = parts.uri.path(), "failed to read request body: {e}");
            return Ok(Response::status(StatusCode::BAD_REQUEST).into_inner());
        }
    };

    let method = parts.method.clone();
    let path = parts.uri.path().to_owned();
    let request = Request::new(parts.method, parts.uri, parts.headers, body, params);
    let response = handler.call(request).await;
    debug!(%method, %path, status = response.status_code().as_u16(), "handled");

    Ok(response.into_inner())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by `kubectl` and most
/// supervisors) and **SIGINT** (Ctrl-C, for local dev). On Windows only
/// Ctrl-C is available. A handler that fails to install is logged and its arm
/// never fires, so the other signal still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` never resolves, so on non-Unix platforms the SIGTERM arm
    // is disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    #[test]
    fn bind_rejects_bad_addresses() {
        assert!(Server::bind("127.0.0.1:8080").is_ok());
        assert!(matches!(Server::bind("localhost"), Err(Error::InvalidArgument(_))));
    }

    /// Starts `router` on a free port. Sending on the returned channel stops it.
    async fn start(
        router: Router,
        drain_timeout: Duration,
    ) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<Result<(), Error>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let signal = async {
            let _ = stopped.await;
        };
        let server = tokio::spawn(run(listener, router, signal, drain_timeout));
        (addr, stop, server)
    }

    #[tokio::test]
    async fn shutdown_closes_idle_keep_alive_connections() {
        let router = Router::new().get("/", |_req: Request| async { "ok" });
        let (addr, stop, server) = start(router, Duration::from_secs(30)).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"GET / HTTP/1.1\r\nhost: localhost\r\n\r\n").await.unwrap();
        let mut response = Vec::new();
        let mut buf = [0u8; 1024];
        while !response.ends_with(b"\r\n\r\nok") {
            let n = client.read(&mut buf).await.unwrap();
            assert_ne!(n, 0, "connection closed before the response arrived");
            response.extend_from_slice(&buf[..n]);
        }

        // The connection is still open and idle.
        stop.send(()).unwrap();
        let stopped = tokio::time::timeout(Duration::from_secs(3), server).await;
        assert!(matches!(stopped, Ok(Ok(Ok(())))));

        let n = client.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0, "server should have closed the idle connection");
    }

    #[tokio::test]
    async fn drain_timeout_aborts_stuck_requests() {
        let router = Router::new().get("/", |_req: Request| async {
            std::future::pending::<()>().await;
            "never"
        });
        let (addr, stop, server) = start(router, Duration::from_millis(100)).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"GET / HTTP/1.1\r\nhost: localhost\r\n\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        stop.send(()).unwrap();
        let stopped = tokio::time::timeout(Duration::from_secs(3), server).await;
        assert!(matches!(stopped, Ok(Ok(Ok(())))));
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let (addr, stop, server) = start(Router::new(), Duration::from_secs(1)).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /missing HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(response.starts_with(b"HTTP/1.1 404 Not Found\r\n"));

        stop.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
