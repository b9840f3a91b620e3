//! Redis-backed credential storage.
//!
//! Credential documents are JSON values keyed by public identifier.
//! Usage counters live in a separate hash per credential so the stats
//! batch can be applied server-side: a single Lua script increments hit
//! counts and merges last-access timestamps with max semantics, making the
//! whole flush atomic and race-free under concurrent flushers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::debug;

use super::{StatsUpdate, Storage};
use crate::credential::{Credential, NewCredential};
use crate::error::{ProvisionError, StorageError};
use crate::token::{Key, KeyId};

const CRED_PREFIX: &str = "token-guard:cred:";
const STATS_PREFIX: &str = "token-guard:stats:";
const ID_PREFIX: &str = "token-guard:id:";
const INDEX_SET: &str = "token-guard:creds";
const SEQ_KEY: &str = "token-guard:seq";

// KEYS: (cred, stats) pair per credential; ARGV: (hits, last_access_us)
// pair per credential. Skips credentials deleted since the batch was
// built.
const STATS_SCRIPT: &str = r"
for i = 1, #KEYS, 2 do
    local j = (i + 1) / 2
    if redis.call('EXISTS', KEYS[i]) == 1 then
        redis.call('HINCRBY', KEYS[i + 1], 'requests', ARGV[2 * j - 1])
        local last = tonumber(redis.call('HGET', KEYS[i + 1], 'last_access_us'))
        local candidate = tonumber(ARGV[2 * j])
        if not last or candidate > last then
            redis.call('HSET', KEYS[i + 1], 'last_access_us', candidate)
        end
    end
end
return redis.status_reply('OK')
";

fn cred_key(id: KeyId) -> String {
    format!("{CRED_PREFIX}{id}")
}

fn stats_key(id: KeyId) -> String {
    format!("{STATS_PREFIX}{id}")
}

fn id_key(id: i64) -> String {
    format!("{ID_PREFIX}{id}")
}

fn unavailable(err: redis::RedisError) -> StorageError {
    StorageError::Unavailable(err.to_string())
}

/// [`Storage`] implementation on a Redis connection manager.
pub struct RedisStorage {
    conn: ConnectionManager,
    stats_script: Script,
}

impl RedisStorage {
    /// Connect to Redis at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the URL is invalid or the
    /// initial connection fails.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let conn = ConnectionManager::new(client).await.map_err(unavailable)?;
        Ok(Self {
            conn,
            stats_script: Script::new(STATS_SCRIPT),
        })
    }

    /// Provision a credential for `key`, validating its patterns first.
    ///
    /// # Errors
    ///
    /// [`ProvisionError::Pattern`] for malformed globs,
    /// [`ProvisionError::Storage`] on backend failure.
    pub async fn store_credential(
        &self,
        key: &Key,
        params: NewCredential,
    ) -> Result<Credential, ProvisionError> {
        let mut conn = self.conn.clone();

        // Storage enforces key-id uniqueness; the cache assumes it.
        let taken: bool = conn
            .exists(cred_key(key.id()))
            .await
            .map_err(unavailable)?;
        if taken {
            return Err(
                StorageError::Unavailable(format!("key id {} already exists", key.id())).into(),
            );
        }

        let id: i64 = conn.incr(SEQ_KEY, 1).await.map_err(unavailable)?;
        let cred = Credential::new(id, key.id(), key.hash(), params, Utc::now())?;
        let doc = serde_json::to_string(&cred)
            .map_err(|e| StorageError::Unavailable(format!("encode credential: {e}")))?;

        let key_id = cred.key_id.to_string();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(cred_key(cred.key_id), doc)
            .ignore()
            .set(id_key(cred.id), &key_id)
            .ignore()
            .sadd(INDEX_SET, &key_id)
            .ignore()
            .del(stats_key(cred.key_id))
            .ignore();
        let _: () = pipe.query_async(&mut conn).await.map_err(unavailable)?;

        Ok(cred)
    }

    /// Delete a credential by public identifier. Returns whether one
    /// existed.
    ///
    /// # Errors
    ///
    /// [`StorageError::Unavailable`] on backend failure.
    pub async fn delete_credential(&self, id: KeyId) -> Result<bool, StorageError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(cred_key(id)).await.map_err(unavailable)?;
        let Some(raw) = raw else {
            return Ok(false);
        };
        let cred = decode(&raw)?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(cred_key(id))
            .ignore()
            .del(stats_key(id))
            .ignore()
            .del(id_key(cred.id))
            .ignore()
            .srem(INDEX_SET, id.to_string())
            .ignore();
        let _: () = pipe.query_async(&mut conn).await.map_err(unavailable)?;

        Ok(true)
    }

    /// List all credentials, ordered by numeric identity.
    ///
    /// # Errors
    ///
    /// [`StorageError::Unavailable`] on backend failure.
    pub async fn list_credentials(&self) -> Result<Vec<Credential>, StorageError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(INDEX_SET).await.map_err(unavailable)?;

        let mut out = Vec::with_capacity(members.len());
        for member in members {
            let Ok(key_id) = member.parse::<KeyId>() else {
                debug!(member = %member, "skipping unparsable index entry");
                continue;
            };
            match self.find_by_key_id(key_id).await {
                Ok(cred) => out.push(cred),
                Err(StorageError::NotFound) => {} // deleted since SMEMBERS
                Err(err) => return Err(err),
            }
        }
        out.sort_by_key(|c| c.id);
        Ok(out)
    }
}

fn decode(raw: &str) -> Result<Credential, StorageError> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::Unavailable(format!("corrupt credential record: {e}")))
}

#[async_trait]
impl Storage for RedisStorage {
    async fn find_by_key_id(&self, id: KeyId) -> Result<Credential, StorageError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.get(cred_key(id)).hgetall(stats_key(id));
        let (raw, stats): (Option<String>, HashMap<String, i64>) =
            pipe.query_async(&mut conn).await.map_err(unavailable)?;

        let raw = raw.ok_or(StorageError::NotFound)?;
        let mut cred = decode(&raw)?;

        cred.requests = stats.get("requests").copied().unwrap_or(0);
        cred.last_access_at = stats
            .get("last_access_us")
            .and_then(|us| DateTime::from_timestamp_micros(*us));

        Ok(cred)
    }

    async fn update_stats(&self, batch: &[StatsUpdate]) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();

        // The numeric-id index is immutable for the lifetime of a
        // credential, so resolving it outside the script does not break
        // the atomicity of the batch itself.
        let mut invocation = self.stats_script.prepare_invoke();
        let mut resolved = 0usize;
        for update in batch {
            let mapped: Option<String> = conn.get(id_key(update.id)).await.map_err(unavailable)?;
            let Some(mapped) = mapped else {
                debug!(id = update.id, "dropping stats for deleted credential");
                continue;
            };
            let key_id = mapped.parse::<KeyId>().map_err(|e| {
                StorageError::Unavailable(format!("corrupt id index for {}: {e}", update.id))
            })?;
            invocation.key(cred_key(key_id)).key(stats_key(key_id));
            invocation
                .arg(update.hits)
                .arg(update.last_access.timestamp_micros());
            resolved += 1;
        }

        if resolved == 0 {
            return Ok(());
        }

        let _: () = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
