//! Listeners. One acceptor task per configured address; TLS listeners
//! get a shared rustls acceptor built from the configured cert/key.

use std::io::BufReader;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::net::TcpListener;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig as RustlsConfig;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info};

use crate::config::Config;
use crate::handlers::Registry;
use crate::network::{ClientStream, Connection};
use crate::state::Matrix;

enum Listener {
    Plain(TcpListener),
    Tls(TcpListener, TlsAcceptor),
}

/// All bound listeners plus the shared dispatch registry.
pub struct Gateway {
    listeners: Vec<Listener>,
    matrix: Arc<Matrix>,
    registry: Arc<Registry>,
}

fn load_tls_acceptor(cert_path: &str, key_path: &str) -> anyhow::Result<TlsAcceptor> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(
        std::fs::File::open(cert_path).with_context(|| format!("open cert {}", cert_path))?,
    ))
    .collect::<Result<_, _>>()
    .with_context(|| format!("parse certs in {}", cert_path))?;

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut BufReader::new(
        std::fs::File::open(key_path).with_context(|| format!("open key {}", key_path))?,
    ))
    .with_context(|| format!("parse key in {}", key_path))?
    .ok_or_else(|| anyhow::anyhow!("no private key in {}", key_path))?;

    let config = RustlsConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("build TLS config")?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

impl Gateway {
    /// Bind every configured listener. Bind and certificate errors are
    /// fatal at startup.
    pub async fn bind(config: &Config, matrix: Arc<Matrix>) -> anyhow::Result<Gateway> {
        let mut listeners = Vec::new();

        for addr in &config.server.listen {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("error binding to {}", addr))?;
            info!(%addr, "listening");
            listeners.push(Listener::Plain(listener));
        }

        for (addr, tls) in &config.server.tlslisten {
            let acceptor = load_tls_acceptor(&tls.cert, &tls.key)?;
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("error binding to {}", addr))?;
            info!(%addr, "listening (TLS)");
            listeners.push(Listener::Tls(listener, acceptor));
        }

        Ok(Gateway {
            listeners,
            matrix,
            registry: Arc::new(Registry::new()),
        })
    }

    /// Bound listener addresses, useful when binding to port 0.
    pub fn local_addrs(&self) -> Vec<std::net::SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|l| match l {
                Listener::Plain(listener) => listener.local_addr().ok(),
                Listener::Tls(listener, _) => listener.local_addr().ok(),
            })
            .collect()
    }

    /// Run every acceptor until the process exits.
    pub async fn run(self) {
        let mut tasks = Vec::new();
        for listener in self.listeners {
            let matrix = Arc::clone(&self.matrix);
            let registry = Arc::clone(&self.registry);
            tasks.push(tokio::spawn(async move {
                match listener {
                    Listener::Plain(listener) => accept_plain(listener, matrix, registry).await,
                    Listener::Tls(listener, acceptor) => {
                        accept_tls(listener, acceptor, matrix, registry).await
                    }
                }
            }));
        }
        for task in tasks {
            let _ = task.await;
        }
    }
}

async fn accept_plain(listener: TcpListener, matrix: Arc<Matrix>, registry: Arc<Registry>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                spawn_connection(ClientStream::Plain(stream), addr, &matrix, &registry);
            }
            Err(e) => error!(error = %e, "accept error"),
        }
    }
}

async fn accept_tls(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    matrix: Arc<Matrix>,
    registry: Arc<Registry>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let acceptor = acceptor.clone();
                let matrix = Arc::clone(&matrix);
                let registry = Arc::clone(&registry);
                // the handshake runs in its own task so a stalled
                // client cannot block the accept loop
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls) => {
                            spawn_connection(
                                ClientStream::Tls(Box::new(tls)),
                                addr,
                                &matrix,
                                &registry,
                            );
                        }
                        Err(e) => error!(%addr, error = %e, "TLS handshake failed"),
                    }
                });
            }
            Err(e) => error!(error = %e, "accept error"),
        }
    }
}

fn spawn_connection(
    stream: ClientStream,
    addr: std::net::SocketAddr,
    matrix: &Arc<Matrix>,
    registry: &Arc<Registry>,
) {
    let uid = matrix.uids.next();
    info!(%uid, %addr, secure = stream.is_secure(), "connection accepted");

    let matrix = Arc::clone(matrix);
    let registry = Arc::clone(registry);
    tokio::spawn(async move {
        let connection = Connection::new(uid, stream, addr, matrix, registry);
        connection.run().await;
        info!(%uid, %addr, "connection closed");
    });
}
