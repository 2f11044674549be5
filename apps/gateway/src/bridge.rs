// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! HTTP/3 client bridge to the streaming engine.
//!
//! Each call opens a fresh QUIC connection to `STREAM_ENGINE_BASE`, sends a
//! single JSON POST, and collects the full response. TLS verification is off
//! by default (self-signed engine certificates are the norm in deployments);
//! `QUIC_INSECURE=0` turns verification back on, and a client certificate is
//! presented when both `QUIC_CLIENT_CERT` and `QUIC_CLIENT_KEY` are set.
//!
//! The whole round trip runs under one 60 second deadline.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, Bytes};
use http::header::CONTENT_TYPE;
use tracing::debug;

use voxgate_core::error::{Result, SpeechError};
use voxgate_core::settings::Settings;

const BRIDGE_TIMEOUT: tokio::time::Duration = tokio::time::Duration::from_secs(60);

/// Collected engine reply: status, content type, and the full body.
#[derive(Debug)]
pub struct BridgeResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl BridgeResponse {
    /// Extract the engine's error detail from a non-200 reply.
    pub fn error_detail(&self) -> String {
        serde_json::from_slice::<voxgate_core::protocol::ErrorBody>(&self.body)
            .map_or_else(|_| format!("backend status {}", self.status), |body| body.error)
    }
}

pub struct EngineBridge {
    settings: Arc<Settings>,
}

impl EngineBridge {
    pub const fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    /// Whether an engine base URL is configured at all.
    pub fn configured(&self) -> bool {
        self.settings.stream_engine_base.is_some()
    }

    /// POST a JSON payload to the engine and collect the full reply.
    ///
    /// # Errors
    ///
    /// `upstream-unavailable` when the base URL is missing or the transfer
    /// fails, `timeout` when the 60 second deadline expires.
    pub async fn post_json(&self, path: &str, payload: &serde_json::Value) -> Result<BridgeResponse> {
        let (host, port) = self.authority()?;
        let body = serde_json::to_vec(payload)
            .map_err(|e| SpeechError::Internal(format!("payload encode failed: {e}")))?;

        match tokio::time::timeout(BRIDGE_TIMEOUT, self.request(&host, port, path, body)).await {
            Ok(result) => result,
            Err(_) => Err(SpeechError::Timeout),
        }
    }

    /// Parse `STREAM_ENGINE_BASE` into `(host, port)`.
    fn authority(&self) -> Result<(String, u16)> {
        let base = self.settings.stream_engine_base.as_deref().ok_or_else(|| {
            SpeechError::UpstreamUnavailable("STREAM_ENGINE_BASE not configured".to_string())
        })?;
        let rest = base.strip_prefix("https://").ok_or_else(|| {
            SpeechError::UpstreamUnavailable(format!(
                "STREAM_ENGINE_BASE must be an https:// URL, got '{base}'"
            ))
        })?;
        let host_port = rest.split('/').next().unwrap_or(rest);
        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    SpeechError::UpstreamUnavailable(format!(
                        "invalid port in STREAM_ENGINE_BASE '{base}'"
                    ))
                })?;
                (host.to_string(), port)
            },
            None => (host_port.to_string(), 443),
        };
        Ok((host, port))
    }

    async fn request(
        &self,
        host: &str,
        port: u16,
        path: &str,
        body: Vec<u8>,
    ) -> Result<BridgeResponse> {
        let remote = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| SpeechError::UpstreamUnavailable(format!("engine lookup failed: {e}")))?
            .next()
            .ok_or_else(|| {
                SpeechError::UpstreamUnavailable(format!("engine host '{host}' did not resolve"))
            })?;

        let endpoint = self.client_endpoint(remote)?;
        let connecting = endpoint.connect(remote, host).map_err(|e| {
            SpeechError::UpstreamUnavailable(format!("engine connect failed: {e}"))
        })?;
        let conn = connecting.await.map_err(|e| {
            SpeechError::UpstreamUnavailable(format!("engine handshake failed: {e}"))
        })?;
        debug!(%remote, "QUIC connection to engine established");

        let (mut driver, mut send_request) =
            h3::client::new(h3_quinn::Connection::new(conn)).await.map_err(|e| {
                SpeechError::UpstreamUnavailable(format!("HTTP/3 setup failed: {e}"))
            })?;

        // The driver owns connection-level frames; park it on its own task.
        let drive = tokio::spawn(async move {
            let closed = std::future::poll_fn(|cx| driver.poll_close(cx)).await;
            debug!(error = %closed, "engine connection closed");
        });

        let uri = format!("https://{host}:{port}{path}");
        let request = http::Request::builder()
            .method(http::Method::POST)
            .uri(&uri)
            .header(CONTENT_TYPE, "application/json")
            .body(())
            .map_err(|e| SpeechError::Internal(format!("request build failed: {e}")))?;

        let upstream = |e: h3::error::StreamError| {
            SpeechError::UpstreamUnavailable(format!("engine stream failed: {e}"))
        };

        let mut stream = send_request.send_request(request).await.map_err(upstream)?;
        stream.send_data(Bytes::from(body)).await.map_err(upstream)?;
        stream.finish().await.map_err(upstream)?;

        let response = stream.recv_response().await.map_err(upstream)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let mut collected = Vec::new();
        while let Some(mut chunk) = stream.recv_data().await.map_err(upstream)? {
            collected.extend_from_slice(&chunk.copy_to_bytes(chunk.remaining()));
        }

        drive.abort();
        endpoint.close(0u32.into(), b"done");

        Ok(BridgeResponse { status, content_type, body: collected })
    }

    fn client_endpoint(&self, remote: SocketAddr) -> Result<quinn::Endpoint> {
        let bind: SocketAddr = if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }
            .parse()
            .map_err(|e| SpeechError::Internal(format!("bind address parse failed: {e}")))?;

        let tls = self.tls_config()?;
        let quic_config = quinn::ClientConfig::new(Arc::new(
            quinn::crypto::rustls::QuicClientConfig::try_from(tls).map_err(|e| {
                SpeechError::Internal(format!("QUIC TLS config rejected: {e}"))
            })?,
        ));

        let mut endpoint = quinn::Endpoint::client(bind)
            .map_err(|e| SpeechError::Internal(format!("client endpoint bind failed: {e}")))?;
        endpoint.set_default_client_config(quic_config);
        Ok(endpoint)
    }

    fn tls_config(&self) -> Result<rustls::ClientConfig> {
        let builder = if self.settings.quic_insecure {
            rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(InsecureVerifier::new()))
        } else {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            rustls::ClientConfig::builder().with_root_certificates(roots)
        };

        let mut tls = match self.settings.quic_client_pair() {
            Some((cert_path, key_path)) => {
                let certs = rustls_pemfile::certs(&mut BufReader::new(
                    File::open(cert_path).map_err(|e| {
                        SpeechError::Internal(format!(
                            "failed to open client certificate {}: {e}",
                            cert_path.display()
                        ))
                    })?,
                ))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| {
                    SpeechError::Internal(format!("client certificate parse failed: {e}"))
                })?;
                let key = rustls_pemfile::private_key(&mut BufReader::new(
                    File::open(key_path).map_err(|e| {
                        SpeechError::Internal(format!(
                            "failed to open client key {}: {e}",
                            key_path.display()
                        ))
                    })?,
                ))
                .map_err(|e| SpeechError::Internal(format!("client key parse failed: {e}")))?
                .ok_or_else(|| {
                    SpeechError::Internal(format!(
                        "no private key found in {}",
                        key_path.display()
                    ))
                })?;
                builder.with_client_auth_cert(certs, key).map_err(|e| {
                    SpeechError::Internal(format!("client certificate rejected: {e}"))
                })?
            },
            None => builder.with_no_client_auth(),
        };

        tls.alpn_protocols = vec![b"h3".to_vec()];
        Ok(tls)
    }
}

/// Accepts any server certificate. Deployments pin trust at the network
/// layer instead; see `QUIC_INSECURE`.
#[derive(Debug)]
struct InsecureVerifier {
    provider: rustls::crypto::CryptoProvider,
}

impl InsecureVerifier {
    fn new() -> Self {
        Self { provider: rustls::crypto::ring::default_provider() }
    }
}

impl rustls::client::danger::ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
