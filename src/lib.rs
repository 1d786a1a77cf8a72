#![allow(clippy::new_without_default)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

pub mod config;
pub mod error;
pub mod evaluation;
pub mod export_data;
pub mod gps_sample;
pub mod logs;
pub mod map_server;
pub mod osrm;
pub mod radius_refiner;
pub mod reconcile;
pub mod session;
pub mod storage;
pub mod timeline;
pub mod trip_data;
mod utils;

pub use error::RouteError;
