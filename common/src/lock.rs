// Redis-backed advisory lock for dispatch deduplication
//
// The scheduler takes a short-lived lock per subscription before publishing
// a fetch job so overlapping scheduler instances do not double-dispatch the
// same due window. Lock loss is benign: the pipeline is at-least-once.

use crate::db::RedisPool;
use crate::errors::StorageError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Distributed lock trait for exclusive access to a named resource
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Acquire a lock with a TTL; fails fast when the resource is held.
    async fn acquire(&self, resource: &str, ttl: Duration) -> Result<LockGuard, StorageError>;
}

/// Guard that releases the lock when dropped
pub struct LockGuard {
    resource: String,
    lock_value: String,
    pool: RedisPool,
}

impl LockGuard {
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let resource = self.resource.clone();
        let lock_value = self.lock_value.clone();
        let pool = self.pool.clone();

        tokio::spawn(async move {
            if let Err(e) = release_lock(&pool, &resource, &lock_value).await {
                warn!(resource = %resource, error = %e, "Failed to release lock on drop");
            }
        });
    }
}

/// SET-NX lock with expiry
pub struct RedisLock {
    pool: RedisPool,
}

impl RedisLock {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DistributedLock for RedisLock {
    async fn acquire(&self, resource: &str, ttl: Duration) -> Result<LockGuard, StorageError> {
        let mut conn = self.pool.get_connection();
        let key = format!("lock:{}", resource);
        let lock_value = Uuid::new_v4().to_string();

        // SET NX EX: set only if absent, with expiration
        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&lock_value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::RedisError(format!("Failed to acquire lock: {}", e)))?;

        if result.is_some() {
            debug!(resource, ttl_seconds = ttl.as_secs(), "Lock acquired");
            Ok(LockGuard {
                resource: resource.to_string(),
                lock_value,
                pool: self.pool.clone(),
            })
        } else {
            Err(StorageError::RedisError(format!(
                "Lock already held for resource: {}",
                resource
            )))
        }
    }
}

/// Delete the key only if we still own it
async fn release_lock(
    pool: &RedisPool,
    resource: &str,
    lock_value: &str,
) -> Result<(), StorageError> {
    let mut conn = pool.get_connection();
    let key = format!("lock:{}", resource);

    let script = r#"
        if redis.call("get", KEYS[1]) == ARGV[1] then
            return redis.call("del", KEYS[1])
        else
            return 0
        end
    "#;

    let released: i32 = redis::Script::new(script)
        .key(&key)
        .arg(lock_value)
        .invoke_async(&mut conn)
        .await
        .map_err(|e| StorageError::RedisError(format!("Failed to release lock: {}", e)))?;

    if released == 1 {
        debug!(resource, "Lock released");
    } else {
        warn!(resource, "Lock was not owned or already expired");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    async fn pool() -> RedisPool {
        let config = RedisConfig {
            url: "redis://localhost:6379".to_string(),
        };
        RedisPool::new(&config).await.unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_acquire_and_release() {
        let lock = RedisLock::new(pool().await);

        let guard = lock
            .acquire("test_resource", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(guard.resource(), "test_resource");
        drop(guard);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let _guard2 = lock
            .acquire("test_resource", Duration::from_secs(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_exclusivity() {
        let p = pool().await;
        let lock1 = RedisLock::new(p.clone());
        let lock2 = RedisLock::new(p);

        let _guard = lock1
            .acquire("exclusive_resource", Duration::from_secs(10))
            .await
            .unwrap();

        assert!(lock2
            .acquire("exclusive_resource", Duration::from_secs(10))
            .await
            .is_err());
    }
}
