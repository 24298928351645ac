// Database layer: PostgreSQL pool, Redis pool, repositories

pub mod pool;
pub mod redis;
pub mod repositories;

pub use pool::DbPool;
pub use redis::RedisPool;
