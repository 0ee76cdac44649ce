pub mod api;
pub mod atproto;
pub mod cache;
pub mod config;
pub mod error;
pub mod ids;
pub mod mastodon;
pub mod oauth;
pub mod rate_limit;
pub mod richtext;
pub mod snowflake;
pub mod translate;
