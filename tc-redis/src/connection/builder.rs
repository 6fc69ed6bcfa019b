//! Builds redis handles for each supported topology.
//!
//! Building never touches the network: clients are created here and connect
//! lazily on their first command. Every configuration problem is therefore
//! reported before any traffic happens.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use redis::{Client, cluster::ClusterClient};

use crate::backend::RedisStore;
use crate::config::{ConnectionConfig, RedisMode};
use crate::connection::sentinel::SentinelMaster;
use crate::error::Error;

/// Port assumed for cluster seed nodes listed without one.
pub const DEFAULT_CLUSTER_PORT: u16 = 6379;

const USERINFO: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// A `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAddr {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl NodeAddr {
    /// Address of `host` on `port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host:port`, or a bare `host` when a default port is given.
    pub fn parse(entry: &str, default_port: Option<u16>, key: &'static str) -> Result<Self, Error> {
        let invalid = || Error::InvalidInstance {
            key,
            value: entry.to_owned(),
        };
        let entry = entry.trim();

        let (host, port) = match (entry.rsplit_once(':'), default_port) {
            (Some((host, port)), _) => (host, port.trim().parse().map_err(|_| invalid())?),
            (None, Some(port)) => (entry, port),
            (None, None) => return Err(invalid()),
        };

        let host = host.trim();
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(host, port))
    }

    /// Connection URL for this node.
    ///
    /// The password goes in the userinfo part with an empty username, which
    /// redis turns into a plain `AUTH <password>`.
    pub(crate) fn url(&self, password: Option<&str>, db: Option<i64>) -> String {
        let mut url = String::from("redis://");
        if let Some(password) = password {
            url.push(':');
            url.extend(utf8_percent_encode(password, USERINFO));
            url.push('@');
        }
        url.push_str(&self.to_string());
        if let Some(db) = db {
            url.push('/');
            url.push_str(&db.to_string());
        }
        url
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// What a handle was built to talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// One server.
    SingleNode {
        /// The server.
        node: NodeAddr,
        /// Database index.
        db: i64,
    },
    /// A primary found through sentinels.
    Sentinel {
        /// Sentinels asked for the primary, in order.
        sentinels: Vec<NodeAddr>,
        /// Name of the monitored master.
        master: String,
        /// Database index on the primary.
        db: i64,
    },
    /// A cluster reached through its seed nodes.
    Cluster {
        /// Seed nodes.
        nodes: Vec<NodeAddr>,
    },
}

impl Topology {
    /// The matching mode tag.
    pub fn mode(&self) -> RedisMode {
        match self {
            Topology::SingleNode { .. } => RedisMode::SingleNode,
            Topology::Sentinel { .. } => RedisMode::Sentinel,
            Topology::Cluster { .. } => RedisMode::Cluster,
        }
    }

    /// Configured entry points: the server, the sentinels or the cluster seeds.
    pub fn nodes(&self) -> &[NodeAddr] {
        match self {
            Topology::SingleNode { node, .. } => std::slice::from_ref(node),
            Topology::Sentinel { sentinels, .. } => sentinels,
            Topology::Cluster { nodes } => nodes,
        }
    }
}

/// Builds a handle for the topology named in `config`.
///
/// Fails with [`Error::UnknownMode`] when the mode tag is not one of
/// `single_node`, `sentinel` or `cluster`.
pub fn build(config: &ConnectionConfig) -> Result<RedisStore, Error> {
    match config.mode()? {
        RedisMode::SingleNode => single_node(config),
        RedisMode::Sentinel => sentinel(config),
        RedisMode::Cluster => cluster(config),
    }
}

/// Direct connection to `host:port/db`.
pub fn single_node(config: &ConnectionConfig) -> Result<RedisStore, Error> {
    let node = NodeAddr::new(config.host.clone(), config.port);
    let client = Client::open(node.url(non_empty(&config.password), Some(config.db)))?;

    Ok(RedisStore::single_node(
        client,
        Topology::SingleNode {
            node,
            db: config.db,
        },
    ))
}

/// Primary of a sentinel-managed set, resolved through the listed sentinels.
pub fn sentinel(config: &ConnectionConfig) -> Result<RedisStore, Error> {
    let key = config.kind.instances_key(RedisMode::Sentinel);
    let instances = required(&config.instances, key, RedisMode::Sentinel)?;
    let sentinels = parse_instances(instances, None, key)?;
    let master = required(
        &config.master_instance,
        config.kind.master_instance_key(),
        RedisMode::Sentinel,
    )?
    .to_owned();

    let topology = Topology::Sentinel {
        sentinels: sentinels.clone(),
        master: master.clone(),
        db: config.master_db,
    };
    let discovery = SentinelMaster::new(
        sentinels,
        non_empty(&config.sentinel_password).map(str::to_owned),
        master,
        config.master_db,
        non_empty(&config.master_password).map(str::to_owned),
        config.socket_timeout,
    );

    Ok(RedisStore::sentinel(discovery, topology, config.socket_timeout))
}

/// Cluster client seeded with the listed startup nodes.
pub fn cluster(config: &ConnectionConfig) -> Result<RedisStore, Error> {
    let key = config.kind.instances_key(RedisMode::Cluster);
    let nodes = parse_instances(
        required(&config.instances, key, RedisMode::Cluster)?,
        Some(DEFAULT_CLUSTER_PORT),
        key,
    )?;

    let mut builder = ClusterClient::builder(
        nodes
            .iter()
            .map(|node| node.url(None, None))
            .collect::<Vec<_>>(),
    );
    if let Some(password) = non_empty(&config.password) {
        builder = builder.password(password.to_owned());
    }

    Ok(RedisStore::cluster(builder.build()?, Topology::Cluster { nodes }))
}

/// Splits a comma separated instance list.
pub fn parse_instances(
    instances: &str,
    default_port: Option<u16>,
    key: &'static str,
) -> Result<Vec<NodeAddr>, Error> {
    instances
        .split(',')
        .map(|entry| NodeAddr::parse(entry, default_port, key))
        .collect()
}

fn required<'a>(
    value: &'a Option<String>,
    key: &'static str,
    mode: RedisMode,
) -> Result<&'a str, Error> {
    non_empty(value).ok_or(Error::MissingSetting {
        key,
        mode: mode.as_str(),
    })
}

// Empty strings count as unset: some clients send `AUTH ""` otherwise.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.trim().is_empty())
}
