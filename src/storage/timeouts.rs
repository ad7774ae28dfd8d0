//! Timeout wrappers for storage operations
//!
//! Every call the service makes into a backing store goes through
//! [`bounded`]. A timeout or a driver failure becomes `StorageUnavailable`
//! with the detail logged here and never returned to the caller.

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::{Result, RustyGuardError};

/// Run a storage operation with a deadline
pub async fn bounded<F, T>(duration: Duration, operation: &'static str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) if e.is_storage_failure() => {
            log::error!("Storage operation '{}' failed: {}", operation, e);
            Err(RustyGuardError::StorageUnavailable(operation.to_string()))
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            log::error!("Storage operation '{}' timed out after {:?}", operation, duration);
            Err(RustyGuardError::StorageUnavailable(operation.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_value_through() {
        let value = bounded(Duration::from_millis(100), "noop", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_timeout_becomes_unavailable() {
        let result: Result<()> = bounded(Duration::from_millis(10), "slow", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(RustyGuardError::StorageUnavailable(op)) if op == "slow"));
    }

    #[tokio::test]
    async fn test_driver_error_is_masked() {
        let result: Result<()> = bounded(Duration::from_millis(100), "find_user", async {
            Err(RustyGuardError::StorageError("pq: relation \"users\" does not exist".to_string()))
        })
        .await;
        match result {
            Err(RustyGuardError::StorageUnavailable(op)) => assert_eq!(op, "find_user"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_domain_errors_pass_through() {
        let result: Result<()> = bounded(Duration::from_millis(100), "create_user", async {
            Err(RustyGuardError::Conflict("Username already taken".to_string()))
        })
        .await;
        assert!(matches!(result, Err(RustyGuardError::Conflict(_))));
    }
}
