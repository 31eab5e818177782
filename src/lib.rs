//! seointel - SEO competitor crawler.
//!
//! Fetches competitor pages with conditional requests, audits their on-page
//! SEO, and keeps a deduplicated snapshot history with alerts, budgets and
//! per-job quality indicators.

pub mod audit;
pub mod cli;
pub mod config;
pub mod http_client;
pub mod migrations;
pub mod models;
pub mod repository;
pub mod schema;
pub mod services;
pub mod utils;
