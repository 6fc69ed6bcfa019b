//! Redis implementation of [`KeyValueStore`].

use std::{fmt, future::Future, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use redis::{
    Client, Cmd, FromRedisValue, aio::ConnectionManager, cluster::ClusterClient,
    cluster_async::ClusterConnection,
};
use tokio::sync::OnceCell;
use tracing::trace;

use crate::connection::{SentinelMaster, Topology};
use crate::error::Error;
use crate::store::KeyValueStore;

enum Target {
    SingleNode(Client),
    Sentinel(SentinelMaster),
    Cluster(ClusterClient),
}

#[derive(Clone)]
enum Connection {
    Managed(ConnectionManager),
    Cluster(ClusterConnection),
}

/// A lazily connected redis handle.
///
/// Nothing is sent over the network until the first command. Single node and
/// sentinel handles use a [`ConnectionManager`]; cluster handles use the
/// cluster client's own connection, which follows slot redirections.
pub struct RedisStore {
    topology: Topology,
    target: Target,
    connection: OnceCell<Connection>,
    timeout: Option<Duration>,
}

impl RedisStore {
    pub(crate) fn single_node(client: Client, topology: Topology) -> Self {
        Self::new(Target::SingleNode(client), topology, None)
    }

    pub(crate) fn sentinel(
        discovery: SentinelMaster,
        topology: Topology,
        timeout: Duration,
    ) -> Self {
        Self::new(Target::Sentinel(discovery), topology, Some(timeout))
    }

    pub(crate) fn cluster(client: ClusterClient, topology: Topology) -> Self {
        Self::new(Target::Cluster(client), topology, None)
    }

    fn new(target: Target, topology: Topology, timeout: Option<Duration>) -> Self {
        Self {
            topology,
            target,
            connection: OnceCell::new(),
            timeout,
        }
    }

    /// What this handle was built to talk to.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    async fn connection(&self) -> Result<Connection, Error> {
        trace!("Get redis connection");
        let connection = self
            .connection
            .get_or_try_init(|| async {
                trace!(mode = %self.topology.mode(), "Initialize new redis connection");
                let connection = match &self.target {
                    Target::SingleNode(client) => {
                        Connection::Managed(client.get_connection_manager().await?)
                    }
                    Target::Sentinel(discovery) => {
                        let client = discovery.master_client().await?;
                        let manager = self
                            .bounded(async { Ok(client.get_connection_manager().await?) })
                            .await?;
                        Connection::Managed(manager)
                    }
                    Target::Cluster(client) => {
                        Connection::Cluster(client.get_async_connection().await?)
                    }
                };
                Ok::<_, Error>(connection)
            })
            .await?;
        Ok(connection.clone())
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => fut.await,
        }
    }

    async fn query<T>(&self, cmd: Cmd) -> Result<T, Error>
    where
        T: FromRedisValue + Send,
    {
        let connection = self.connection().await?;
        self.bounded(async move {
            let value = match connection {
                Connection::Managed(mut con) => cmd.query_async(&mut con).await?,
                Connection::Cluster(mut con) => cmd.query_async(&mut con).await?,
            };
            Ok(value)
        })
        .await
    }
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("topology", &self.topology)
            .field("connected", &self.connection.initialized())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        let value: Option<Vec<u8>> = self.query(cmd).await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        self.query::<()>(cmd).await
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        self.query::<i64>(cmd).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        self.query(cmd).await
    }

    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> Result<(), Error> {
        let mut cmd = redis::cmd("EXPIREAT");
        cmd.arg(key).arg(at.timestamp());
        self.query::<i64>(cmd).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<i64, Error> {
        let mut cmd = redis::cmd("TTL");
        cmd.arg(key);
        self.query(cmd).await
    }
}
