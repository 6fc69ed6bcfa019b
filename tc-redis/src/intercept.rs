//! Backend error interception.
//!
//! Every storage operation that talks to redis runs through [`intercept`].
//! Configuration errors pass through untouched; backend errors are handed to
//! a recovery closure that decides what the caller sees.

use std::{future::Future, sync::Arc};

use tracing::error;

use crate::config::StorageKind;
use crate::connection::ConnectionResolver;
use crate::error::Error;
use crate::store::KeyValueStore;

/// Runs `operation`, handing backend errors to `recover`.
pub async fn intercept<T, F, R>(operation: &'static str, fut: F, recover: R) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
    R: FnOnce(&'static str, Error) -> Result<T, Error>,
{
    match fut.await {
        Err(error) if error.is_backend() => recover(operation, error),
        result => result,
    }
}

/// Connection plus error policy of one storage.
#[derive(Debug)]
pub(crate) struct Guard {
    resolver: ConnectionResolver,
    kind: StorageKind,
    ignore_errors: bool,
}

impl Guard {
    pub(crate) fn new(
        resolver: ConnectionResolver,
        kind: StorageKind,
        ignore_errors: bool,
    ) -> Self {
        Self {
            resolver,
            kind,
            ignore_errors,
        }
    }

    pub(crate) fn resolver(&self) -> &ConnectionResolver {
        &self.resolver
    }

    /// Runs `op` against the current handle.
    ///
    /// On a backend error the handle is invalidated. The error is then
    /// either logged and replaced by `fallback` or returned unchanged,
    /// depending on the store's `IGNORE_ERRORS` flag.
    pub(crate) async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        fallback: T,
        op: F,
    ) -> Result<T, Error>
    where
        F: FnOnce(Arc<dyn KeyValueStore>) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let store = self.resolver.store()?;
        intercept(operation, op(store.clone()), |operation, error| {
            self.recover(&store, operation, error, fallback)
        })
        .await
    }

    fn recover<T>(
        &self,
        store: &Arc<dyn KeyValueStore>,
        operation: &'static str,
        error: Error,
        fallback: T,
    ) -> Result<T, Error> {
        self.resolver.invalidate(store);

        if self.ignore_errors {
            error!(
                storage = self.label(),
                mode = %self.resolver.mode(),
                operation,
                error = %error,
                "Redis storage failure ignored"
            );
            Ok(fallback)
        } else {
            Err(error)
        }
    }

    fn label(&self) -> &'static str {
        match self.kind {
            StorageKind::Storage => "storage",
            StorageKind::ResultStorage => "result_storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_backend_errors_reach_recovery() {
        let result = intercept(
            "exists",
            async { Err::<bool, _>(Error::Timeout(Duration::from_secs(2))) },
            |operation, error| {
                assert_eq!(operation, "exists");
                assert!(matches!(error, Error::Timeout(_)));
                Ok(false)
            },
        )
        .await;

        assert!(!result.unwrap());
    }

    #[tokio::test]
    async fn test_configuration_errors_skip_recovery() {
        let result = intercept(
            "put_crypto",
            async { Err::<(), _>(Error::MissingSecurityKey) },
            |_, _| panic!("recovery must not run for configuration errors"),
        )
        .await;

        assert!(matches!(result, Err(Error::MissingSecurityKey)));
    }

    #[tokio::test]
    async fn test_success_skips_recovery() {
        let result = intercept("get", async { Ok(7) }, |_, _| Ok(0)).await;
        assert_eq!(result.unwrap(), 7);
    }
}
