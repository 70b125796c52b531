pub mod app;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod http;
pub mod logging;
pub mod output;
pub mod page;
pub mod scrape;
pub mod source;
pub mod store;
