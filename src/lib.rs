//! Marketplace stock-state pipeline: derives stockout/restock transitions from
//! a polled availability log and forecasts per-product stock trends.

pub mod api;
pub mod config;
pub mod db;
pub mod deriver;
pub mod error;
pub mod forecast;
pub mod pipeline;
pub mod source;
pub mod types;
