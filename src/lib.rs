//! Quant Gateway: market data, options analytics and broker connectivity
//! behind one HTTP API.

pub mod alerts;
pub mod brokers;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod fallback;
pub mod feeds;
pub mod logging;
pub mod settings;
pub mod sidecar;
pub mod strategy;
pub mod sync;
pub mod telegram;
pub mod web;
