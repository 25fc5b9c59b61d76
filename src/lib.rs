//! Territory scan engine
//!
//! Background job processing for geographic business discovery: a durable
//! job store polled by a single worker, a rate-limited paginated search
//! fetcher, a spatial coverage grid, TTL caches, and the multi-phase scan
//! pipeline that turns an area and a vertical into ranked prospects.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
