//! Timed TCP connects, optionally followed by a TLS handshake.
//!
//! Certificates are not checked and no data is ever sent over the stream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::future::BoxFuture;
use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, Error as TlsError, RootCertStore, ServerName};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;

use crate::domain::probe::{ProbeFailure, ProbeTrial};

/// One attempt to time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialSpec {
    pub addr: SocketAddr,
    pub tls: bool,
    pub timeout: Duration,
}

/// Pluggable trial runner; resolves to the latency in milliseconds.
pub type ProberFn = Arc<dyn Fn(TrialSpec) -> BoxFuture<'static, ProbeTrial> + Send + Sync>;

struct InsecureCertVerifier;

impl ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }
}

fn probe_client_config() -> ClientConfig {
    let mut cfg = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(RootCertStore::empty())
        .with_no_client_auth();
    cfg.dangerous()
        .set_certificate_verifier(Arc::new(InsecureCertVerifier));
    cfg
}

/// The production prober. `sni` is sent in the ClientHello; when empty or not
/// a valid name, the target IP is used instead.
pub fn tcp_prober(sni: &str) -> ProberFn {
    let connector = TlsConnector::from(Arc::new(probe_client_config()));
    let server_name = if sni.trim().is_empty() {
        None
    } else {
        ServerName::try_from(sni.trim()).ok()
    };
    if server_name.is_none() && !sni.trim().is_empty() {
        tracing::warn!(target: "probe", sni, "invalid sni name, falling back to target ip");
    }
    Arc::new(move |spec: TrialSpec| -> BoxFuture<'static, ProbeTrial> {
        let connector = connector.clone();
        let server_name = server_name.clone();
        Box::pin(timed_connect(spec, connector, server_name))
    })
}

async fn timed_connect(
    spec: TrialSpec,
    connector: TlsConnector,
    server_name: Option<ServerName>,
) -> ProbeTrial {
    let attempt = async {
        let start = Instant::now();
        let tcp = TcpStream::connect(spec.addr).await?;
        if !spec.tls {
            let elapsed = start.elapsed();
            drop(tcp);
            return Ok(elapsed);
        }
        let name = server_name.unwrap_or(ServerName::IpAddress(spec.addr.ip()));
        let stream = connector
            .connect(name, tcp)
            .await
            .map_err(|e| ProbeFailure::Handshake(e.to_string()))?;
        let elapsed = start.elapsed();
        drop(stream);
        Ok::<Duration, ProbeFailure>(elapsed)
    };
    match tokio::time::timeout(spec.timeout, attempt).await {
        Ok(Ok(elapsed)) => Ok(elapsed.as_secs_f64() * 1000.0),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(ProbeFailure::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn plain_connect_measures_latency() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move {
            let _ = listener.accept().await;
        });
        let prober = tcp_prober("cloudflare.com");
        let trial = prober(TrialSpec {
            addr,
            tls: false,
            timeout: Duration::from_secs(2),
        })
        .await;
        assert!(trial.unwrap() >= 0.0);
        accept.abort();
    }

    #[tokio::test]
    async fn closed_port_is_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let prober = tcp_prober("");
        let trial = prober(TrialSpec {
            addr,
            tls: false,
            timeout: Duration::from_secs(2),
        })
        .await;
        assert_eq!(trial, Err(ProbeFailure::Refused));
    }

    #[tokio::test]
    async fn handshake_against_plain_server_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            if let Ok((sock, _)) = listener.accept().await {
                // close without speaking TLS
                drop(sock);
            }
        });
        let prober = tcp_prober("cloudflare.com");
        let trial = prober(TrialSpec {
            addr,
            tls: true,
            timeout: Duration::from_secs(2),
        })
        .await;
        assert!(matches!(trial, Err(ProbeFailure::Handshake(_))));
        server.abort();
    }
}
