//! Pooled multiplexed Redis connections.

use std::path::Path;

use deadpool::managed::{self, Metrics, PoolConfig};
use redis::{Client, ClientTlsConfig, ErrorKind, RedisError, RedisResult, TlsCertificates, aio::MultiplexedConnection};

use config::{RedisConfig, RedisTlsConfig};

pub(super) type Pool = managed::Pool<Manager>;

pub(super) type Connection = managed::Object<Manager>;

/// Opens connections from a single client and health checks them before reuse.
#[derive(Debug)]
pub(super) struct Manager {
    client: Client,
}

impl Manager {
    fn new(config: &RedisConfig) -> RedisResult<Self> {
        let client = match &config.tls {
            Some(tls) if tls.insecure => Client::open(insecure_url(&config.url))?,
            Some(tls) => Client::build_with_tls(config.url.as_str(), certificates(tls)?)?,
            None => Client::open(config.url.as_str())?,
        };

        Ok(Self { client })
    }
}

impl managed::Manager for Manager {
    type Type = MultiplexedConnection;
    type Error = RedisError;

    async fn create(&self) -> Result<MultiplexedConnection, RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    async fn recycle(&self, conn: &mut MultiplexedConnection, _: &Metrics) -> managed::RecycleResult<RedisError> {
        let reply: String = redis::cmd("PING").query_async(conn).await?;

        match reply.as_str() {
            "PONG" => Ok(()),
            _ => Err(managed::RecycleError::message(format!("Unexpected PING reply: {reply}"))),
        }
    }
}

/// The redis client skips certificate validation for URLs ending in `#insecure`.
fn insecure_url(url: &str) -> String {
    if url.ends_with("#insecure") {
        url.to_string()
    } else {
        format!("{url}#insecure")
    }
}

fn certificates(tls: &RedisTlsConfig) -> RedisResult<TlsCertificates> {
    let client_tls = match (&tls.client_cert, &tls.client_key) {
        (Some(cert), Some(key)) => Some(ClientTlsConfig {
            client_cert: read_pem(cert, "client certificate")?,
            client_key: read_pem(key, "client key")?,
        }),
        (None, None) => None,
        _ => {
            return Err(RedisError::from((
                ErrorKind::InvalidClientConfig,
                "Mutual TLS needs both client_cert and client_key",
            )));
        }
    };

    let root_cert = tls
        .ca_cert
        .as_deref()
        .map(|path| read_pem(path, "CA certificate"))
        .transpose()?;

    Ok(TlsCertificates { client_tls, root_cert })
}

fn read_pem(path: &Path, what: &'static str) -> RedisResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        RedisError::from((
            ErrorKind::IoError,
            what,
            format!("{}: {e}", path.display()),
        ))
    })
}

pub(super) fn create_pool(config: &RedisConfig) -> RedisResult<Pool> {
    let manager = Manager::new(config)?;

    let mut pool_config = PoolConfig::new(config.pool.max_size);
    pool_config.timeouts.create = Some(config.pool.connect_timeout);
    pool_config.timeouts.wait = Some(config.pool.wait_timeout);
    pool_config.timeouts.recycle = Some(config.pool.recycle_timeout);

    Pool::builder(manager)
        .config(pool_config)
        .runtime(deadpool::Runtime::Tokio1)
        .build()
        .map_err(|e| RedisError::from((ErrorKind::ClientError, "Failed to build the connection pool", e.to_string())))
}
