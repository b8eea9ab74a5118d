//! Plugin lifecycle: upload, enable, disable, delete, reload.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use bytes::Bytes;
use tempfile::TempDir;
use tokio::sync::OwnedMutexGuard;
use tool_primitives::{
    PluginId, PluginKind, ToolCapability, ToolConfiguration, settings,
    validate_identifier,
};
use tool_registry::ToolRegistry;
use tracing::{info, warn};

use crate::archive::{self, ArchiveLimits};
use crate::blob::{BlobError, BlobStore};
use crate::error::{LoaderError, LoaderResult};
use crate::manifest::{
    self, CAPABILITIES_FILE, MANIFEST_FILE, ManifestDescriptor, PluginManifest, PluginOverrides,
    SecurityVerdict,
};
use crate::scanner::{self, Finding, Problem};

/// Filesystem layout and limits used by the loader.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    plugins_dir: PathBuf,
    scratch_dir: Option<PathBuf>,
    limits: ArchiveLimits,
}

impl LoaderConfig {
    /// Installs working copies under `plugins_dir`.
    #[must_use]
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            scratch_dir: None,
            limits: ArchiveLimits::default(),
        }
    }

    /// Extracts uploads under `scratch_dir` instead of the system temp dir.
    #[must_use]
    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(scratch_dir.into());
        self
    }

    /// Overrides the archive limits.
    #[must_use]
    pub fn with_limits(mut self, limits: ArchiveLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Returns the plugins directory.
    #[must_use]
    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Returns the archive limits.
    #[must_use]
    pub const fn limits(&self) -> ArchiveLimits {
        self.limits
    }
}

/// An extracted, parsed, and scanned archive. Dropping it removes the
/// scratch directory.
struct Staged {
    _scratch: TempDir,
    root: PathBuf,
    descriptor: ManifestDescriptor,
    capabilities: Vec<ToolCapability>,
    verdict: SecurityVerdict,
}

fn stage(archive: &[u8], scratch_dir: Option<&Path>, limits: ArchiveLimits) -> LoaderResult<Staged> {
    let builder = {
        let mut builder = tempfile::Builder::new();
        builder.prefix("plugin-");
        builder
    };
    let scratch = match scratch_dir {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|err| LoaderError::io(dir, err))?;
            builder.tempdir_in(dir)
        }
        None => builder.tempdir(),
    }
    .map_err(|err| LoaderError::io(scratch_dir.unwrap_or(Path::new("<tmp>")), err))?;

    let root = archive::extract(archive, scratch.path(), limits)?;

    let read = |file: &'static str| {
        let path = root.join(file);
        fs::read(&path).map_err(|err| LoaderError::io(path, err))
    };
    let descriptor = manifest::parse_manifest(&read(MANIFEST_FILE)?)?;
    let capabilities = manifest::parse_capabilities(&read(CAPABILITIES_FILE)?)?;

    let sources = archive::python_sources(&root)?;
    let mut findings = Vec::new();
    for (relative, path) in &sources {
        let raw = fs::read(path).map_err(|err| LoaderError::io(path, err))?;
        match String::from_utf8(raw) {
            Ok(source) => findings.extend(scanner::scan_source(relative, &source)),
            Err(_) => findings.push(Finding {
                file: relative.clone(),
                line: 1,
                problem: Problem::Syntax("source is not valid UTF-8".to_owned()),
            }),
        }
    }
    let verdict = SecurityVerdict::from_findings(&findings, sources.len());

    Ok(Staged {
        _scratch: scratch,
        root,
        descriptor,
        capabilities,
        verdict,
    })
}

/// A working copy swapped into place whose predecessor is kept until commit.
struct Installation {
    target: PathBuf,
    backup: Option<PathBuf>,
}

impl Installation {
    fn commit(self) {
        if let Some(backup) = self.backup {
            if let Err(err) = fs::remove_dir_all(&backup) {
                warn!(path = %backup.display(), %err, "failed to remove previous working copy");
            }
        }
    }

    fn rollback(self) {
        let _ = fs::remove_dir_all(&self.target);
        if let Some(backup) = self.backup {
            if let Err(err) = fs::rename(&backup, &self.target) {
                warn!(path = %self.target.display(), %err, "failed to restore previous working copy");
            }
        }
    }
}

/// Copies `root` to a staging directory, then renames it over `plugins_dir/name`.
fn install(root: &Path, plugins_dir: &Path, name: &str) -> LoaderResult<Installation> {
    fs::create_dir_all(plugins_dir).map_err(|err| LoaderError::io(plugins_dir, err))?;
    let tag = PluginId::random();
    let staging = plugins_dir.join(format!(".staging-{name}-{tag}"));
    if let Err(err) = archive::copy_tree(root, &staging) {
        let _ = fs::remove_dir_all(&staging);
        return Err(err);
    }

    let target = plugins_dir.join(name);
    let backup = if target.exists() {
        let backup = plugins_dir.join(format!(".previous-{name}-{tag}"));
        if let Err(err) = fs::rename(&target, &backup) {
            let _ = fs::remove_dir_all(&staging);
            return Err(LoaderError::io(&target, err));
        }
        Some(backup)
    } else {
        None
    };

    if let Err(err) = fs::rename(&staging, &target) {
        let _ = fs::remove_dir_all(&staging);
        if let Some(backup) = &backup {
            let _ = fs::rename(backup, &target);
        }
        return Err(LoaderError::io(&target, err));
    }

    Ok(Installation { target, backup })
}

async fn blocking<T, F>(task: F) -> LoaderResult<T>
where
    F: FnOnce() -> LoaderResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| LoaderError::Task {
            reason: err.to_string(),
        })?
}

fn archive_key(name: &str) -> String {
    format!("{name}/{name}.zip")
}

/// Fills settings the executor needs but the descriptor may leave implicit.
fn apply_install_defaults(config: &mut ToolConfiguration, kind: PluginKind, name: &str, target: &Path) {
    match kind {
        PluginKind::Executable => {
            if config.setting(settings::WORKING_DIR).is_none() {
                config.insert_setting(settings::WORKING_DIR, target.to_string_lossy().into_owned());
            }
        }
        PluginKind::NativeModule => {
            if config.setting(settings::MODULE).is_none()
                && config.setting(settings::PROVIDER).is_none()
            {
                config.insert_setting(settings::MODULE, name);
            }
        }
        PluginKind::HttpApi => {}
    }
}

/// Accepts plugin archives and keeps blob storage, working copies, and the
/// registry consistent with each other.
pub struct PluginLoader {
    registry: Arc<ToolRegistry>,
    blobs: Arc<dyn BlobStore>,
    config: LoaderConfig,
    manifests: RwLock<HashMap<String, Arc<PluginManifest>>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PluginLoader {
    /// Creates a loader registering into `registry` and persisting to `blobs`.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, blobs: Arc<dyn BlobStore>, config: LoaderConfig) -> Self {
        Self {
            registry,
            blobs,
            config,
            manifests: RwLock::default(),
            locks: Mutex::default(),
        }
    }

    /// Returns the loader configuration.
    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Serialises mutating operations on a single plugin name.
    async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().expect("plugin locks poisoned");
            Arc::clone(locks.entry(name.to_owned()).or_default())
        };
        lock.lock_owned().await
    }

    fn require(&self, name: &str) -> LoaderResult<Arc<PluginManifest>> {
        self.manifest(name).ok_or_else(|| LoaderError::UnknownPlugin {
            name: name.to_owned(),
        })
    }

    /// Validates, stores, installs, and registers an uploaded archive.
    ///
    /// An existing plugin of the same name is replaced.
    ///
    /// # Errors
    ///
    /// Returns the first failure encountered; see [`LoaderError::kind`] for
    /// the category. On error no registry entry, blob, or working copy from
    /// this upload remains.
    pub async fn upload(
        &self,
        archive: Bytes,
        name: &str,
        overrides: Option<PluginOverrides>,
    ) -> LoaderResult<(PluginId, String)> {
        validate_identifier(name).map_err(LoaderError::InvalidName)?;
        let limits = self.config.limits;
        let size = archive.len() as u64;
        if size > limits.max_archive_bytes {
            return Err(LoaderError::ArchiveTooLarge {
                size,
                limit: limits.max_archive_bytes,
            });
        }

        let _guard = self.lock(name).await;

        let replacing = match self.registry.get(name) {
            Some(existing) if !existing.metadata().kind().is_plugin() => {
                return Err(LoaderError::NameConflict {
                    name: name.to_owned(),
                });
            }
            Some(_) => true,
            None => false,
        };

        let staged = {
            let archive = archive.clone();
            let scratch_dir = self.config.scratch_dir.clone();
            blocking(move || stage(&archive, scratch_dir.as_deref(), limits)).await?
        };
        let Staged {
            _scratch,
            root,
            descriptor,
            capabilities,
            verdict,
        } = staged;

        if let Some(reason) = verdict.first_reason() {
            warn!(plugin = name, reason, findings = verdict.reasons().len(), "plugin rejected");
            return Err(LoaderError::SecurityViolation {
                reason: reason.to_owned(),
            });
        }

        let metadata = manifest::build_metadata(name, &descriptor, capabilities)?;
        let target = self.config.plugins_dir.join(name);
        let mut config = manifest::build_config(&descriptor, &overrides.unwrap_or_default());
        apply_install_defaults(&mut config, descriptor.kind, name, &target);

        let key = archive_key(name);
        let previous_blob = match self.blobs.get(&key).await {
            Ok(bytes) => Some(bytes),
            Err(BlobError::NotFound { .. }) => None,
            Err(err) => return Err(err.into()),
        };
        self.blobs.put(&key, archive).await?;

        let installation = {
            let plugins_dir = self.config.plugins_dir.clone();
            let plugin = name.to_owned();
            match blocking(move || install(&root, &plugins_dir, &plugin)).await {
                Ok(installation) => installation,
                Err(err) => {
                    self.restore_blob(&key, previous_blob).await;
                    return Err(err);
                }
            }
        };

        let registered = if replacing {
            self.registry
                .register_replacing(metadata.clone(), config.clone())
        } else {
            self.registry.register(metadata.clone(), config.clone())
        };
        let tool_id = match registered {
            Ok(id) => id,
            Err(err) => {
                let _ = blocking(move || {
                    installation.rollback();
                    Ok(())
                })
                .await;
                self.restore_blob(&key, previous_blob).await;
                return Err(err.into());
            }
        };
        let _ = blocking(move || {
            installation.commit();
            Ok(())
        })
        .await;

        let id = PluginId::from(tool_id);
        let message = format!(
            "plugin `{name}` v{} loaded with {} capabilities",
            metadata.version(),
            metadata.capabilities().len()
        );
        info!(
            plugin = name,
            %id,
            version = metadata.version(),
            kind = %metadata.kind(),
            scanned = verdict.scanned_files(),
            replaced = replacing,
            "plugin uploaded"
        );

        let manifest = PluginManifest::new(id, descriptor, metadata, config, verdict, key);
        self.manifests
            .write()
            .expect("plugin manifests poisoned")
            .insert(name.to_owned(), Arc::new(manifest));

        Ok((id, message))
    }

    async fn restore_blob(&self, key: &str, previous: Option<Bytes>) {
        let restored = match previous {
            Some(bytes) => self.blobs.put(key, bytes).await,
            None => self.blobs.delete(key).await,
        };
        if let Err(err) = restored {
            warn!(key, %err, "failed to roll back plugin archive");
        }
    }

    /// Enables a loaded plugin.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::UnknownPlugin`] when the plugin is not loaded.
    pub fn enable(&self, name: &str) -> LoaderResult<()> {
        self.require(name)?;
        self.registry.set_enabled(name, true)?;
        Ok(())
    }

    /// Disables a loaded plugin without removing it.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::UnknownPlugin`] when the plugin is not loaded.
    pub fn disable(&self, name: &str) -> LoaderResult<()> {
        self.require(name)?;
        self.registry.set_enabled(name, false)?;
        Ok(())
    }

    /// Removes a plugin's working copy, registry entry, and stored archive.
    ///
    /// A failure to delete the stored archive is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::UnknownPlugin`] when the plugin is not loaded
    /// and [`LoaderError::Io`] when the working copy cannot be removed.
    pub async fn delete(&self, name: &str) -> LoaderResult<()> {
        let _guard = self.lock(name).await;
        let manifest = self.require(name)?;

        let dir = self.config.plugins_dir.join(name);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(LoaderError::io(dir, err)),
        }

        self.registry.unregister(name);
        self.manifests
            .write()
            .expect("plugin manifests poisoned")
            .remove(name);

        if let Err(err) = self.blobs.delete(manifest.archive_key()).await {
            warn!(plugin = name, %err, "failed to delete plugin archive");
        }
        info!(plugin = name, "plugin deleted");
        Ok(())
    }

    /// Re-reads the stored archive, re-scans it, and swaps the working copy.
    ///
    /// The registry entry, including its capabilities and health, is left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::UnknownPlugin`] when the plugin is not loaded,
    /// and any extraction, scan, or install failure. The previous working
    /// copy stays in place on failure.
    pub async fn reload(&self, name: &str) -> LoaderResult<String> {
        let _guard = self.lock(name).await;
        let current = self.require(name)?;
        let archive = self.blobs.get(current.archive_key()).await?;

        let limits = self.config.limits;
        let scratch_dir = self.config.scratch_dir.clone();
        let staged = blocking(move || stage(&archive, scratch_dir.as_deref(), limits)).await?;

        if let Some(reason) = staged.verdict.first_reason() {
            warn!(plugin = name, reason, "plugin reload rejected");
            return Err(LoaderError::SecurityViolation {
                reason: reason.to_owned(),
            });
        }
        if staged.descriptor.version != current.descriptor().version {
            warn!(
                plugin = name,
                stored = %staged.descriptor.version,
                registered = %current.descriptor().version,
                "stored archive version differs from registered metadata"
            );
        }

        let root = staged.root.clone();
        let plugins_dir = self.config.plugins_dir.clone();
        let plugin = name.to_owned();
        blocking(move || install(&root, &plugins_dir, &plugin).map(Installation::commit)).await?;

        let reloaded = current.reloaded(staged.descriptor, staged.verdict);
        self.manifests
            .write()
            .expect("plugin manifests poisoned")
            .insert(name.to_owned(), Arc::new(reloaded));

        info!(plugin = name, "plugin reloaded");
        Ok(format!("plugin `{name}` reloaded"))
    }

    /// Returns the last accepted manifest of a plugin.
    ///
    /// # Panics
    ///
    /// Panics if the internal manifest lock is poisoned.
    #[must_use]
    pub fn manifest(&self, name: &str) -> Option<Arc<PluginManifest>> {
        self.manifests
            .read()
            .expect("plugin manifests poisoned")
            .get(name)
            .cloned()
    }

    /// Returns every loaded plugin's manifest, ordered by name.
    ///
    /// # Panics
    ///
    /// Panics if the internal manifest lock is poisoned.
    #[must_use]
    pub fn manifests(&self) -> Vec<Arc<PluginManifest>> {
        let mut manifests: Vec<_> = self
            .manifests
            .read()
            .expect("plugin manifests poisoned")
            .values()
            .cloned()
            .collect();
        manifests.sort_by(|a, b| a.name().cmp(b.name()));
        manifests
    }
}

#[cfg(test)]
mod tests {
    use tool_primitives::{ToolKind, ToolMetadata};

    use super::*;
    use crate::archive::tests::zip_of;
    use crate::blob::MemoryBlobStore;
    use crate::error::LoadFailureKind;

    const MANIFEST: &str = r#"{
        "name": "weather",
        "version": "1.0.0",
        "kind": "executable",
        "description": "Weather lookups",
        "config": {"command": "python3", "args": ["main.py"]}
    }"#;

    const CAPABILITIES: &str = r#"[{
        "name": "get_current",
        "description": "Current conditions",
        "input_schema": [{"name": "location", "type": "string", "required": true}]
    }]"#;

    const CLEAN: &str = "import json\nimport sys\n\nprint(json.dumps({'ok': True}))\n";

    struct Fixture {
        _dirs: (TempDir, TempDir),
        plugins: PathBuf,
        scratch: PathBuf,
        registry: Arc<ToolRegistry>,
        blobs: Arc<MemoryBlobStore>,
        loader: PluginLoader,
    }

    fn fixture() -> Fixture {
        let plugins = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let registry = Arc::new(ToolRegistry::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let loader = PluginLoader::new(
            Arc::clone(&registry),
            blobs.clone(),
            LoaderConfig::new(plugins.path()).with_scratch_dir(scratch.path()),
        );
        Fixture {
            plugins: plugins.path().to_path_buf(),
            scratch: scratch.path().to_path_buf(),
            _dirs: (plugins, scratch),
            registry,
            blobs,
            loader,
        }
    }

    fn archive(main: &str) -> Bytes {
        Bytes::from(zip_of(&[
            ("weather/manifest.json", MANIFEST),
            ("weather/capabilities.json", CAPABILITIES),
            ("weather/main.py", main),
        ]))
    }

    fn is_empty_dir(path: &Path) -> bool {
        fs::read_dir(path).map_or(true, |mut entries| entries.next().is_none())
    }

    #[tokio::test]
    async fn upload_registers_stores_and_installs() {
        let f = fixture();
        let (id, message) = f.loader.upload(archive(CLEAN), "weather", None).await.unwrap();
        assert!(message.contains("weather"));

        let record = f.registry.get("weather").expect("registered");
        assert_eq!(PluginId::from(record.id()), id);
        assert_eq!(record.metadata().kind(), ToolKind::Plugin(PluginKind::Executable));
        let working_dir = f.plugins.join("weather").to_string_lossy().into_owned();
        assert_eq!(
            record.config().setting_str(settings::WORKING_DIR),
            Some(working_dir.as_str())
        );

        assert_eq!(f.blobs.keys(), ["weather/weather.zip"]);
        assert!(f.plugins.join("weather/main.py").is_file());
        assert!(is_empty_dir(&f.scratch));

        let manifest = f.loader.manifest("weather").unwrap();
        assert!(manifest.verdict().passed());
        assert_eq!(manifest.verdict().scanned_files(), 1);
    }

    #[tokio::test]
    async fn missing_descriptor_leaves_nothing_behind() {
        let f = fixture();
        let bytes = Bytes::from(zip_of(&[("manifest.json", MANIFEST), ("main.py", CLEAN)]));
        let err = f.loader.upload(bytes, "weather", None).await.unwrap_err();

        assert!(matches!(err, LoaderError::MissingDescriptor { .. }));
        assert_eq!(err.kind(), LoadFailureKind::PluginLoad);
        assert!(f.registry.get("weather").is_none());
        assert!(f.blobs.keys().is_empty());
        assert!(is_empty_dir(&f.plugins));
        assert!(is_empty_dir(&f.scratch));
    }

    #[tokio::test]
    async fn denied_import_is_a_security_violation() {
        let f = fixture();
        let err = f
            .loader
            .upload(archive("import subprocess\nsubprocess.run(['ls'])\n"), "weather", None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), LoadFailureKind::SecurityViolation);
        assert!(err.to_string().contains("security violation: denied import `subprocess`"));
        assert!(f.registry.get("weather").is_none());
        assert!(f.blobs.keys().is_empty());
        assert!(is_empty_dir(&f.plugins));
    }

    #[tokio::test]
    async fn rejects_names_owned_by_internal_tools() {
        let f = fixture();
        let internal = ToolMetadata::builder("weather", ToolKind::Internal)
            .version("1.0.0")
            .unwrap()
            .build()
            .unwrap();
        f.registry.register(internal, ToolConfiguration::new()).unwrap();

        let err = f.loader.upload(archive(CLEAN), "weather", None).await.unwrap_err();
        assert!(matches!(err, LoaderError::NameConflict { .. }));
        assert_eq!(
            f.registry.get("weather").unwrap().metadata().kind(),
            ToolKind::Internal
        );
    }

    #[tokio::test]
    async fn rejects_invalid_names_and_oversize_uploads() {
        let f = fixture();
        assert!(matches!(
            f.loader.upload(archive(CLEAN), "../weather", None).await,
            Err(LoaderError::InvalidName(_))
        ));

        let small = PluginLoader::new(
            Arc::clone(&f.registry),
            f.blobs.clone(),
            LoaderConfig::new(&f.plugins).with_limits(ArchiveLimits {
                max_archive_bytes: 16,
                ..ArchiveLimits::default()
            }),
        );
        assert!(matches!(
            small.upload(archive(CLEAN), "weather", None).await,
            Err(LoaderError::ArchiveTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn reupload_replaces_plugin_and_cancels_old_lease() {
        let f = fixture();
        f.loader.upload(archive(CLEAN), "weather", None).await.unwrap();
        let lease = f.registry.lease("weather").unwrap();

        let overrides = PluginOverrides {
            disabled: true,
            ..PluginOverrides::default()
        };
        f.loader
            .upload(archive("print('v2')\n"), "weather", Some(overrides))
            .await
            .unwrap();

        assert!(lease.cancel.is_cancelled());
        assert!(!f.registry.get("weather").unwrap().config().is_enabled());
        let main = fs::read_to_string(f.plugins.join("weather/main.py")).unwrap();
        assert_eq!(main, "print('v2')\n");
        let leftovers: Vec<_> = fs::read_dir(&f.plugins).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn enable_disable_and_delete() {
        let f = fixture();
        f.loader.upload(archive(CLEAN), "weather", None).await.unwrap();

        f.loader.disable("weather").unwrap();
        assert!(!f.registry.get("weather").unwrap().config().is_enabled());
        f.loader.enable("weather").unwrap();
        assert!(f.registry.get("weather").unwrap().config().is_enabled());

        f.loader.delete("weather").await.unwrap();
        assert!(f.registry.get("weather").is_none());
        assert!(f.blobs.keys().is_empty());
        assert!(!f.plugins.join("weather").exists());
        assert!(f.loader.manifest("weather").is_none());
        assert!(matches!(
            f.loader.enable("weather"),
            Err(LoaderError::UnknownPlugin { .. })
        ));
    }

    #[tokio::test]
    async fn reload_swaps_working_copy_without_touching_registry() {
        let f = fixture();
        f.loader.upload(archive(CLEAN), "weather", None).await.unwrap();
        let before = f.registry.get("weather").unwrap();

        fs::write(f.plugins.join("weather/main.py"), "tampered").unwrap();
        let message = f.loader.reload("weather").await.unwrap();
        assert!(message.contains("reloaded"));

        let after = f.registry.get("weather").unwrap();
        assert_eq!(before.id(), after.id());
        assert_eq!(
            fs::read_to_string(f.plugins.join("weather/main.py")).unwrap(),
            CLEAN
        );
        assert!(is_empty_dir(&f.scratch));
    }
}
