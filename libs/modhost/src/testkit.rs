//! Shared in-crate test fixtures.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use semver::Version;

use crate::contracts::{AppModule, ModuleFactory};

/// Minimal module instance for host-level tests.
pub struct TestModule {
    id: String,
    version: Mutex<Option<Version>>,
}

impl TestModule {
    pub fn factory() -> Arc<dyn ModuleFactory> {
        Arc::new(|id: &str| {
            Arc::new(TestModule {
                id: id.to_owned(),
                version: Mutex::new(None),
            }) as Arc<dyn AppModule>
        })
    }
}

#[async_trait]
impl AppModule for TestModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> Option<Version> {
        self.version.lock().clone()
    }

    fn set_version(&self, version: Version) {
        *self.version.lock() = Some(version);
    }
}
