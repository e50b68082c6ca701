//! pgtrail - PostgreSQL database activity monitor
//!
//! Classifies every database of a monitored server as healthy, low-activity,
//! static or dead from its connection history.

pub mod config;
pub mod db;
pub mod engine;
pub mod web;
