use super::{CasOutcome, SharedStore, StoreError, Versioned};
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::info;

// Each key is a hash: `v` holds the version, `data` the serialized record.
// A cleared key keeps `v` so versions never go backwards.
const CAS_SCRIPT: &str = r#"
local current = tonumber(redis.call('HGET', KEYS[1], 'v') or '0')
if current ~= tonumber(ARGV[1]) then
  return {0, current}
end
local next_version = current + 1
redis.call('HSET', KEYS[1], 'v', next_version)
if ARGV[2] == '1' then
  redis.call('HSET', KEYS[1], 'data', ARGV[3])
else
  redis.call('HDEL', KEYS[1], 'data')
end
return {1, next_version}
"#;

const PUT_SCRIPT: &str = r#"
local next_version = redis.call('HINCRBY', KEYS[1], 'v', 1)
if ARGV[1] == '1' then
  redis.call('HSET', KEYS[1], 'data', ARGV[2])
else
  redis.call('HDEL', KEYS[1], 'data')
end
return next_version
"#;

/// Redis-backed store shared by actors on different processes or hosts.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    cas_script: Script,
    put_script: Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        info!(url = %url, "Connected to Redis store");

        Ok(Self::with_connection(conn))
    }

    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            cas_script: Script::new(CAS_SCRIPT),
            put_script: Script::new(PUT_SCRIPT),
        }
    }
}

/// Script arguments for an optional value: presence flag plus payload
fn value_args(value: &Option<String>) -> (&'static str, &str) {
    match value {
        Some(data) => ("1", data.as_str()),
        None => ("0", ""),
    }
}

impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Versioned, StoreError> {
        let mut conn = self.conn.clone();
        let (version, value): (Option<u64>, Option<String>) = redis::cmd("HMGET")
            .arg(key)
            .arg("v")
            .arg("data")
            .query_async(&mut conn)
            .await?;

        Ok(Versioned {
            version: version.unwrap_or(0),
            value,
        })
    }

    async fn put(&self, key: &str, value: Option<String>) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let (flag, data) = value_args(&value);

        let mut invocation = self.put_script.key(key);
        invocation.arg(flag).arg(data);
        let version: u64 = invocation.invoke_async(&mut conn).await?;

        Ok(version)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: u64,
        value: Option<String>,
    ) -> Result<CasOutcome, StoreError> {
        let mut conn = self.conn.clone();
        let (flag, data) = value_args(&value);

        let mut invocation = self.cas_script.key(key);
        invocation.arg(expected).arg(flag).arg(data);
        let (applied, version): (i64, u64) = invocation.invoke_async(&mut conn).await?;

        Ok(if applied == 1 {
            CasOutcome::Committed(version)
        } else {
            CasOutcome::Conflict(version)
        })
    }
}
