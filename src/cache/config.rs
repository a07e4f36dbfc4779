use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_backend")]
    pub backend: String,
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub db: u8,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Fallback TTL in seconds for values stored without one, 0 keeps them forever
    #[serde(default)]
    pub default_ttl: u64,
}

fn default_cache_backend() -> String {
    "redis".to_string()
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_key_prefix() -> String {
    "course_review:".to_string()
}

impl CacheConfig {
    /// `host:port` of the key-value endpoint
    pub fn dsn(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connection URL without credentials
    pub fn redis_url(&self) -> String {
        format!("redis://{}/{}", self.dsn(), self.db)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            host: default_redis_host(),
            port: default_redis_port(),
            db: 0,
            key_prefix: default_key_prefix(),
            default_ttl: 0,
        }
    }
}
