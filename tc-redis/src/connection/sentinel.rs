//! Master discovery through redis sentinel.

use std::time::Duration;

use redis::Client;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::builder::NodeAddr;
use crate::error::Error;

/// Resolves the current primary of a sentinel-monitored set.
///
/// Sentinels are asked in order and the first answer wins. Sentinels that
/// cannot be reached within the socket timeout are skipped.
#[derive(Debug, Clone)]
pub struct SentinelMaster {
    sentinels: Vec<NodeAddr>,
    sentinel_password: Option<String>,
    master: String,
    db: i64,
    master_password: Option<String>,
    socket_timeout: Duration,
}

impl SentinelMaster {
    /// Discovery over `sentinels` for the primary named `master`.
    ///
    /// `sentinel_password` authenticates against the sentinels only;
    /// `master_password` and `db` apply to the primary once found.
    pub fn new(
        sentinels: Vec<NodeAddr>,
        sentinel_password: Option<String>,
        master: String,
        db: i64,
        master_password: Option<String>,
        socket_timeout: Duration,
    ) -> Self {
        Self {
            sentinels,
            sentinel_password,
            master,
            db,
            master_password,
            socket_timeout,
        }
    }

    /// Name of the monitored master.
    pub fn master_name(&self) -> &str {
        &self.master
    }

    /// Asks the sentinels for the primary's address.
    pub async fn discover(&self) -> Result<NodeAddr, Error> {
        for sentinel in &self.sentinels {
            match self.ask(sentinel).await {
                Ok(Some(addr)) => {
                    debug!(
                        sentinel = %sentinel,
                        master = %self.master,
                        primary = %addr,
                        "Resolved redis primary"
                    );
                    return Ok(addr);
                }
                Ok(None) => {
                    debug!(
                        sentinel = %sentinel,
                        master = %self.master,
                        "Sentinel does not know master"
                    );
                }
                Err(error) => {
                    warn!(sentinel = %sentinel, error = %error, "Sentinel unreachable");
                }
            }
        }
        Err(Error::MasterNotFound(self.master.clone()))
    }

    /// A client for the current primary.
    pub async fn master_client(&self) -> Result<Client, Error> {
        let primary = self.discover().await?;
        Ok(Client::open(self.master_url(&primary))?)
    }

    fn sentinel_url(&self, sentinel: &NodeAddr) -> String {
        sentinel.url(self.sentinel_password.as_deref(), None)
    }

    fn master_url(&self, primary: &NodeAddr) -> String {
        primary.url(self.master_password.as_deref(), Some(self.db))
    }

    async fn ask(&self, sentinel: &NodeAddr) -> Result<Option<NodeAddr>, Error> {
        let client = Client::open(self.sentinel_url(sentinel))?;

        let query = async {
            let mut con = client.get_multiplexed_async_connection().await?;
            redis::cmd("SENTINEL")
                .arg("get-master-addr-by-name")
                .arg(&self.master)
                .query_async::<Option<(String, u16)>>(&mut con)
                .await
        };

        let reply = timeout(self.socket_timeout, query)
            .await
            .map_err(|_| Error::Timeout(self.socket_timeout))??;

        Ok(reply.map(|(host, port)| NodeAddr::new(host, port)))
    }
}
