pub mod archive;
pub mod audit;
pub mod config;
pub mod error;
pub mod service;
pub mod shipment;
pub mod transform;
pub mod types;
pub mod utils;

pub use error::ArchiveError;
pub use service::ArchivalService;
pub use types::{Actor, Role};
