//! CLI command implementations.

pub mod common;
pub mod config;
pub mod directions;
pub mod geocode;
pub mod home;
pub mod nearby;
pub mod route;
pub mod schedule;
pub mod vehicles;
