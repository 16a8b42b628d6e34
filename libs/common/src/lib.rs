pub mod id;
pub mod snowflake;

pub use snowflake::{snowflake_created_at, SnowflakeError, SnowflakeGenerator};
