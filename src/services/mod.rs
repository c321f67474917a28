// src/services/mod.rs

//! Crawl and directory services.
//!
//! - `robots`: crawl-permission evaluation with a shared per-host cache
//! - `gate`: per-host request pacing
//! - `places`: directory record source (trait + Google Places client)
//! - `discovery`: menu discovery crawler

pub mod discovery;
pub mod gate;
pub mod places;
pub mod robots;

pub use discovery::MenuDiscovery;
pub use gate::HostGate;
pub use places::{GooglePlacesClient, PlaceDirectory};
pub use robots::{PolicyStore, RobotsPolicy};
