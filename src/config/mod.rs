mod loader;

pub use loader::{Config, ReportConfig, ShrinkerConfig};
