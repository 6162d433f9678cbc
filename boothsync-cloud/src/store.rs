//! Remote object store abstraction.

use crate::error::CloudResult;
use async_trait::async_trait;

/// A key/value blob store shared by every kiosk.
///
/// Keys are slash-delimited and case-sensitive. There is no multi-key
/// transaction and no locking: the last successful writer of a key wins.
#[async_trait]
pub trait RemoteObjectStore: Send + Sync {
    /// Returns the name of the backing provider.
    fn provider_name(&self) -> &'static str;

    /// Writes an object, replacing any previous content.
    async fn put(&self, key: &str, bytes: &[u8]) -> CloudResult<()>;

    /// Reads an object. A missing key is `Ok(None)`, not an error.
    async fn get(&self, key: &str) -> CloudResult<Option<Vec<u8>>>;

    /// Lists every key starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> CloudResult<Vec<String>>;

    /// Deletes an object. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> CloudResult<()>;

    /// Checks that the store is reachable and the credentials are accepted.
    async fn probe(&self) -> CloudResult<()>;
}
