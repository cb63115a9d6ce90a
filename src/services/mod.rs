pub mod allowlist;
pub mod catalog;
pub mod http;
pub mod identity;
pub mod meta;
pub mod metrics;
pub mod poster;
pub mod streams;
pub mod url_resolver;
