pub mod config;
pub mod detector;
pub mod discovery;
pub mod feed;
pub mod model;
pub mod registry;
pub mod report;
pub mod retry;
pub mod risk;
pub mod sandbox;
pub mod scan;
pub mod state;

pub use config::Config;
pub use discovery::DiscoveryCoordinator;
pub use model::{Findings, PackageId, PackageInfo, ScanReport};
pub use risk::{RiskLevel, RiskScore};
pub use scan::ScanCoordinator;
pub use state::StateStore;
