#![allow(dead_code)]

//! Shared fixtures: scriptable modules, entry-file builders, zip archives.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use semver::Version;

use modhost::{
    AppHost, AppModule, Manager, ManagerConfig, ModuleEventHandler, ModuleFactory, Place,
};

/// Records every lifecycle call made against modules created by one factory,
/// and lets a test script declined operations.
#[derive(Default)]
pub struct Probe {
    calls: Mutex<Vec<String>>,
    declined: Mutex<HashSet<String>>,
    pub handler: Mutex<Option<Arc<dyn ModuleEventHandler>>>,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn decline(&self, op: &str) {
        self.declined.lock().insert(op.to_owned());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn run(&self, id: &str, op: &str) -> bool {
        self.calls.lock().push(format!("{id}:{op}"));
        !self.declined.lock().contains(op)
    }
}

pub struct ScriptedModule {
    id: String,
    probe: Arc<Probe>,
    version: Mutex<Option<Version>>,
}

impl ScriptedModule {
    pub fn factory(probe: Arc<Probe>) -> Arc<dyn ModuleFactory> {
        Arc::new(move |id: &str| {
            Arc::new(ScriptedModule {
                id: id.to_owned(),
                probe: Arc::clone(&probe),
                version: Mutex::new(None),
            }) as Arc<dyn AppModule>
        })
    }
}

#[async_trait]
impl AppModule for ScriptedModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> Option<Version> {
        self.version.lock().clone()
    }

    fn set_version(&self, version: Version) {
        *self.version.lock() = Some(version);
    }

    async fn install(&self) -> anyhow::Result<bool> {
        Ok(self.probe.run(&self.id, "install"))
    }

    async fn uninstall(&self) -> anyhow::Result<bool> {
        Ok(self.probe.run(&self.id, "uninstall"))
    }

    async fn upgrade(&self) -> anyhow::Result<bool> {
        Ok(self.probe.run(&self.id, "upgrade"))
    }

    fn bootstrap(&self, _host: &AppHost) -> anyhow::Result<()> {
        self.probe.run(&self.id, "bootstrap");
        Ok(())
    }

    fn event_handler(&self) -> Option<Arc<dyn ModuleEventHandler>> {
        self.probe.handler.lock().clone()
    }
}

pub fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |c| {
        c.to_uppercase().collect::<String>() + chars.as_str()
    })
}

pub fn entry_name(id: &str) -> String {
    format!("{}Module.json", upper_first(id))
}

pub fn manifest_json(id: &str, version: &str) -> serde_json::Value {
    serde_json::json!({
        "class": format!("{id}.Module"),
        "namespace": id,
        "capability": "app-module",
        "config": { "id": id, "version": version }
    })
}

/// Writes `manifest` as the entry file of a module directory under `place`.
pub fn write_module(place: &Path, id: &str, manifest: &serde_json::Value) -> PathBuf {
    let dir = place.join(id);
    std::fs::create_dir_all(&dir).unwrap();
    let entry = dir.join(entry_name(id));
    std::fs::write(&entry, serde_json::to_string_pretty(manifest).unwrap()).unwrap();
    entry
}

/// Builds a module zip archive with the entry file at the archive root.
pub fn build_archive(path: &Path, id: &str, manifest: &serde_json::Value) {
    use std::io::Write as _;

    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    zip.start_file(entry_name(id), options).unwrap();
    zip.write_all(serde_json::to_string_pretty(manifest).unwrap().as_bytes())
        .unwrap();
    zip.start_file("assets/app.css", options).unwrap();
    zip.write_all(b"body {}").unwrap();
    zip.finish().unwrap();
}

pub struct Rig {
    pub manager: Manager,
    pub host: Arc<AppHost>,
    pub probe: Arc<Probe>,
    pub place: PathBuf,
    pub work: tempfile::TempDir,
}

/// A manager over one place directory, with a scripted factory registered for
/// each listed module class.
pub fn rig(place: &Path, classes: &[&str], auto_activate: bool) -> Rig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let work = tempfile::tempdir().unwrap();
    let host = Arc::new(AppHost::new());
    let probe = Probe::new();
    for class in classes {
        host.register_factory(*class, ScriptedModule::factory(Arc::clone(&probe)));
    }
    let config = ManagerConfig {
        places: vec![Place {
            alias: "modules".to_owned(),
            path: place.to_path_buf(),
        }],
        auto_activate,
        work_dir: work.path().to_path_buf(),
        ..ManagerConfig::default()
    };
    let manager = Manager::builder(config, Arc::clone(&host)).build().unwrap();
    Rig {
        manager,
        host,
        probe,
        place: place.to_path_buf(),
        work,
    }
}
