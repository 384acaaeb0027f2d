//! Survey report pipeline.
//!
//! Loads a survey spreadsheet, stores it in SQLite, cross-tabulates the
//! answers, runs chi-square association tests, draws bar charts and writes
//! HTML, PDF, Word and JSON reports.

pub mod aggregate;
pub mod charts;
pub mod config;
pub mod db;
pub mod export;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod telemetry;
