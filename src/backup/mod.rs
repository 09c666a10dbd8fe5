mod locator;

pub use locator::ClusterBackupLocator;
