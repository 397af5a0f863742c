//! Key-value connector backed by Redis.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::KvStore;
use crate::error::ClientResult;

/// Thin typed wrapper over a Redis connection.
///
/// Operations go through a [`ConnectionManager`], which multiplexes one
/// connection and transparently reconnects after a drop. The manager is
/// cheap to clone, so each call works on its own handle.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to the store at `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> ClientResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn lpush(&self, key: &str, value: &str) -> ClientResult<()> {
        let mut con = self.manager.clone();
        let _: () = con.lpush(key, value).await?;
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> ClientResult<()> {
        let mut con = self.manager.clone();
        let _: () = con.sadd(key, member).await?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> ClientResult<()> {
        let mut con = self.manager.clone();
        let _: () = con.srem(key, member).await?;
        Ok(())
    }

    async fn scard(&self, key: &str) -> ClientResult<u64> {
        let mut con = self.manager.clone();
        let count: u64 = con.scard(key).await?;
        Ok(count)
    }

    async fn smembers(&self, key: &str) -> ClientResult<Vec<String>> {
        let mut con = self.manager.clone();
        let members: Vec<String> = con.smembers(key).await?;
        Ok(members)
    }

    async fn srandmember(&self, key: &str) -> ClientResult<Option<String>> {
        let mut con = self.manager.clone();
        let member: Option<String> = con.srandmember(key).await?;
        Ok(member)
    }

    async fn srandmember_many(&self, keys: &[String]) -> ClientResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.srandmember(key);
        }
        let mut con = self.manager.clone();
        let members: Vec<Option<String>> = pipe.query_async(&mut con).await?;
        Ok(members)
    }

    async fn del(&self, key: &str) -> ClientResult<()> {
        let mut con = self.manager.clone();
        let _: () = con.del(key).await?;
        Ok(())
    }
}
