//! Valkey/Redis-backed [`KvStore`].

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::KvStore;

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: i64) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let ttl = ttl_secs.max(1) as u64;
        let _: () = conn.set_ex(key, value, ttl).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: bool = conn.expire(key, ttl_secs).await?;
        Ok(())
    }

    async fn persist(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: bool = conn.persist(key).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: u64 = conn.del(key).await?;
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: u64 = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: u64 = conn.zrem(key, member).await?;
        Ok(())
    }

    async fn zpopmin(&self, key: &str) -> anyhow::Result<Option<(String, f64)>> {
        let mut conn = self.conn.clone();
        let result: Vec<(String, f64)> = conn.zpopmin(key, 1).await?;
        Ok(result.into_iter().next())
    }

    async fn zcard(&self, key: &str) -> anyhow::Result<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.zcard(key).await?)
    }

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> anyhow::Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.zrange(key, start, stop).await?)
    }

    async fn zrevrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> anyhow::Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.zrevrange(key, start, stop).await?)
    }

    async fn sadd(&self, key: &str, member: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: u64 = conn.sadd(key, member).await?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: u64 = conn.srem(key, member).await?;
        Ok(())
    }

    async fn scard(&self, key: &str) -> anyhow::Result<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.scard(key).await?)
    }

    async fn smembers(&self, key: &str) -> anyhow::Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(key).await?)
    }
}
