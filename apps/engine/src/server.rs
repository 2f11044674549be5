// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! QUIC endpoint and HTTP/3 stream plumbing.
//!
//! One `h3` connection is driven per QUIC connection; each request stream is
//! served on its own task. A request is dispatched only after the peer ends
//! the stream, and the response goes out as headers plus a single DATA frame.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, Bytes};
use h3::server::RequestStream;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::router;
use crate::state::EngineState;

const SERVER_HEADER: &str = concat!("voxgate-engine/", env!("CARGO_PKG_VERSION"));

/// Bind the UDP endpoint and serve until shutdown.
///
/// # Errors
///
/// Returns an error on fatal startup problems: unparsable address, port
/// bind failure, or unreadable certificate material.
pub async fn start_server(
    config: &Config,
    state: Arc<EngineState>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = config.server.address.parse()?;
    let tls = load_tls(&config.server.cert_path, &config.server.key_path)?;
    let quic_config = quinn::ServerConfig::with_crypto(Arc::new(
        quinn::crypto::rustls::QuicServerConfig::try_from(tls)?,
    ));
    let endpoint = quinn::Endpoint::server(quic_config, addr)?;

    info!(address = %addr, "HTTP/3 engine listening");

    // Set up graceful shutdown signal handler
    // These expect() calls are justified: installing signal handlers only
    // fails in environments where the process cannot run at all.
    #[allow(clippy::expect_used)]
    let shutdown_signal = async {
        let ctrl_c = async {
            tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!("Received CTRL-C signal, initiating graceful shutdown"),
            () = terminate => info!("Received SIGTERM signal, initiating graceful shutdown"),
        }
    };
    tokio::pin!(shutdown_signal);

    loop {
        tokio::select! {
            () = &mut shutdown_signal => break,
            incoming = endpoint.accept() => {
                let Some(incoming) = incoming else { break };
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    match incoming.await {
                        Ok(conn) => handle_connection(conn, state).await,
                        Err(err) => debug!(error = %err, "QUIC handshake failed"),
                    }
                });
            }
        }
    }

    endpoint.close(0u32.into(), b"shutdown");
    endpoint.wait_idle().await;
    info!("engine stopped");
    Ok(())
}

fn load_tls(cert_path: &str, key_path: &str) -> Result<rustls::ServerConfig, Box<dyn std::error::Error>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path).map_err(
        |e| format!("failed to open certificate {cert_path}: {e}"),
    )?))
    .collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(
        File::open(key_path).map_err(|e| format!("failed to open key {key_path}: {e}"))?,
    ))?
    .ok_or_else(|| format!("no private key found in {key_path}"))?;

    let mut tls =
        rustls::ServerConfig::builder().with_no_client_auth().with_single_cert(certs, key)?;
    tls.alpn_protocols = vec![b"h3".to_vec()];
    Ok(tls)
}

async fn handle_connection(conn: quinn::Connection, state: Arc<EngineState>) {
    let peer = conn.remote_address();
    info!(%peer, "QUIC connection established");

    let mut h3_conn: h3::server::Connection<_, Bytes> =
        match h3::server::Connection::new(h3_quinn::Connection::new(conn)).await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(%peer, error = %err, "HTTP/3 connection setup failed");
                return;
            },
        };

    loop {
        match h3_conn.accept().await {
            Ok(Some(resolver)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    match resolver.resolve_request().await {
                        Ok((req, stream)) => {
                            // A reset stream surfaces as an error here; the
                            // response is simply dropped.
                            if let Err(err) = serve_request(&state, req, stream).await {
                                debug!(error = %err, "request stream ended early");
                            }
                        },
                        Err(err) => debug!(error = %err, "request resolution failed"),
                    }
                });
            },
            Ok(None) => break,
            Err(err) => {
                debug!(%peer, error = %err, "QUIC connection terminated");
                break;
            },
        }
    }

    info!(%peer, "QUIC connection closed");
}

async fn serve_request<T>(
    state: &Arc<EngineState>,
    req: http::Request<()>,
    mut stream: RequestStream<T, Bytes>,
) -> Result<(), h3::error::StreamError>
where
    T: h3::quic::BidiStream<Bytes>,
{
    // Accumulate DATA frames until the peer signals end-of-stream; only
    // then is the handler invoked.
    let mut body = Vec::new();
    while let Some(mut chunk) = stream.recv_data().await? {
        let bytes = chunk.copy_to_bytes(chunk.remaining());
        body.extend_from_slice(&bytes);
    }

    let reply = router::dispatch(state, req.method(), req.uri().path(), &body).await;

    let response = match http::Response::builder()
        .status(reply.status)
        .header("server", SERVER_HEADER)
        .header(http::header::CONTENT_TYPE, reply.content_type)
        .body(())
    {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "failed to build response");
            return Ok(());
        },
    };

    stream.send_response(response).await?;
    stream.send_data(reply.body).await?;
    stream.finish().await
}
