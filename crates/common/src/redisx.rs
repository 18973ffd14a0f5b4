use anyhow::Result;
use async_trait::async_trait;
use redis::{AsyncCommands, ErrorKind, RedisError, Value};

use crate::error::StoreError;
use crate::store::Store;
use crate::types::Reply;

#[derive(Clone)]
pub struct RedisStore {
    pub conn: redis::aio::MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

fn map_err(err: RedisError) -> StoreError {
    match err.kind() {
        ErrorKind::NoScriptError => StoreError::NoScript,
        ErrorKind::ExtensionError => {
            let code = err.code().unwrap_or_default();
            match err.detail() {
                Some(detail) => StoreError::Script(format!("{code} {detail}")),
                None => StoreError::Script(code.to_string()),
            }
        }
        _ => StoreError::Redis(err),
    }
}

fn to_reply(value: Value) -> Reply {
    match value {
        Value::Nil => Reply::Nil,
        Value::Okay => Reply::Okay,
        Value::Status(s) => Reply::Status(s),
        Value::Data(b) => Reply::Bulk(b),
        Value::Int(i) => Reply::Int(i),
        other => Reply::Other(format!("{other:?}")),
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        let data: Option<Vec<u8>> = conn.hget(key, field).await.map_err(map_err)?;
        Ok(data)
    }

    async fn script_load(&self, source: &str) -> Result<String, StoreError> {
        let mut conn = self.conn.clone();
        let sha: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(source)
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(sha)
    }

    async fn evalsha(&self, sha: &str, keys: &[&str], args: &[&[u8]]) -> Result<Reply, StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(sha).arg(keys.len());
        for key in keys {
            cmd.arg(*key);
        }
        for arg in args {
            cmd.arg(*arg);
        }
        let value: Value = cmd.query_async(&mut conn).await.map_err(map_err)?;
        Ok(to_reply(value))
    }
}
