//! Endpoint module archive assembly.
//!
//! Builds the jar that is mounted into the Spektr container. The archive
//! holds everything found on the module locations and the effective
//! classpath, plus one service-registration entry listing the modules the
//! Spektr service activates at boot.
//!
//! Merge rules:
//! - roots are visited in order: module locations first, then classpath roots
//! - the first root to provide an entry name wins; later duplicates are skipped
//! - `META-INF/services*` entries of the inputs are never copied
//! - the archive's own `META-INF/MANIFEST.MF` is always the first entry
//!
//! The archive is written to a `.partial` file and renamed into place only
//! once it is complete, so a failed assembly never leaves a usable jar.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::classpath::Classpath;
use crate::errors::AssemblyError;
use crate::module::{ModuleLocator, ModuleReference};

#[cfg(test)]
#[path = "assembler_tests.rs"]
mod tests;

/// Entry read by the Spektr service to discover endpoint modules.
pub const SERVICE_REGISTRATION_ENTRY: &str =
    "META-INF/services/org.khorum.oss.spektr.dsl.EndpointModule";

/// Reserved prefix; input entries below it are never copied.
const SERVICES_PREFIX: &str = "META-INF/services";

const ARCHIVE_PREFIX: &str = "spektr-modules-";
const PARTIAL_PREFIX: &str = ".spektr-modules-";

const MANIFEST_ENTRY: &str = "META-INF/MANIFEST.MF";
const MANIFEST_CONTENT: &str = "Manifest-Version: 1.0\r\nCreated-By: spektr-test\r\n\r\n";

/// Builds a deployable archive from endpoint modules.
pub trait ArtifactAssembler: Send + Sync {
    /// Assemble an archive registering `modules` in the given order.
    fn assemble(&self, modules: &[ModuleReference]) -> Result<AssembledArtifact, AssemblyError>;
}

/// A finished archive on disk.
///
/// The file is deleted when this value is dropped.
#[derive(Debug)]
pub struct AssembledArtifact {
    path: TempPath,
    entry_count: usize,
}

impl AssembledArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base name of the archive file.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Number of entries written, including the manifest and registration.
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Delete the archive now instead of on drop.
    pub fn delete(self) -> io::Result<()> {
        self.path.close()
    }
}

/// Assembles endpoint module jars from module locations and the classpath.
#[derive(Clone)]
pub struct ModuleJarBuilder {
    locator: Arc<dyn ModuleLocator>,
    classpath: Classpath,
    output_dir: PathBuf,
}

impl std::fmt::Debug for ModuleJarBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleJarBuilder")
            .field("classpath", &self.classpath)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl ModuleJarBuilder {
    pub fn new(locator: impl ModuleLocator + 'static, classpath: Classpath) -> Self {
        Self {
            locator: Arc::new(locator),
            classpath,
            output_dir: std::env::temp_dir(),
        }
    }

    /// Write archives into `dir` instead of the system temp directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Classpath roots in visiting order, without duplicates.
    ///
    /// # Errors
    /// Fails when a module has no registered location or the location
    /// does not exist.
    pub fn collect_roots(&self, modules: &[ModuleReference]) -> Result<Vec<PathBuf>, AssemblyError> {
        let mut seen = HashSet::new();
        let mut roots = Vec::new();

        for module in modules {
            let location =
                self.locator
                    .locate(module)
                    .ok_or_else(|| AssemblyError::ModuleNotLocated {
                        module: module.to_string(),
                    })?;

            if !location.exists() {
                return Err(AssemblyError::ModuleLocationMissing {
                    module: module.to_string(),
                    path: location.display().to_string(),
                });
            }

            if seen.insert(location.clone()) {
                roots.push(location);
            }
        }

        for root in self.classpath.effective_roots() {
            if seen.insert(root.clone()) {
                roots.push(root);
            }
        }

        Ok(roots)
    }

    fn write_archive(
        &self,
        modules: &[ModuleReference],
        roots: &[PathBuf],
        file: &mut File,
        archive_path: &Path,
        output_dir: &Path,
    ) -> Result<usize, AssemblyError> {
        let mut jar = JarWriter::new(file, archive_path, output_dir)?;

        for root in roots {
            if root.is_dir() {
                jar.add_directory_root(root)?;
            } else if root.is_file() && root.extension().is_some_and(|ext| ext == "jar") {
                jar.add_jar_root(root)?;
            } else {
                debug!(root = %root.display(), "Ignoring classpath root that is neither a directory nor a jar");
            }
        }

        jar.add_service_registration(modules)?;
        jar.finish()
    }
}

impl ArtifactAssembler for ModuleJarBuilder {
    fn assemble(&self, modules: &[ModuleReference]) -> Result<AssembledArtifact, AssemblyError> {
        if modules.is_empty() {
            return Err(AssemblyError::NoModules);
        }

        let roots = self.collect_roots(modules)?;
        info!(
            modules = modules.len(),
            roots = roots.len(),
            output_dir = %self.output_dir.display(),
            "Assembling endpoint module archive"
        );

        fs::create_dir_all(&self.output_dir)
            .map_err(|e| AssemblyError::io("create output directory", &self.output_dir, e))?;
        let output_dir = fs::canonicalize(&self.output_dir)
            .map_err(|e| AssemblyError::io("resolve output directory", &self.output_dir, e))?;

        let mut partial = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .suffix(".jar.partial")
            .tempfile_in(&self.output_dir)
            .map_err(|e| AssemblyError::io("create temporary archive", &self.output_dir, e))?;

        let partial_path = partial.path().to_path_buf();
        let entry_count = self.write_archive(
            modules,
            &roots,
            partial.as_file_mut(),
            &partial_path,
            &output_dir,
        )?;

        let final_path = self
            .output_dir
            .join(format!("{ARCHIVE_PREFIX}{}.jar", uuid::Uuid::new_v4().simple()));
        partial
            .persist(&final_path)
            .map_err(|e| AssemblyError::io("finalize archive", &final_path, e.error))?;
        let path = TempPath::try_from_path(&final_path).map_err(|e| {
            let _ = fs::remove_file(&final_path);
            AssemblyError::io("track archive", &final_path, e)
        })?;

        info!(
            archive = %final_path.display(),
            entries = entry_count,
            "Assembled endpoint module archive"
        );

        Ok(AssembledArtifact { path, entry_count })
    }
}

/// Zip writer that refuses duplicate entry names.
struct JarWriter<'a, W: Write + Seek> {
    zip: ZipWriter<W>,
    added: HashSet<String>,
    archive_path: &'a Path,
    /// Canonical directory receiving archives; never copied from.
    output_dir: &'a Path,
}

impl<'a, W: Write + Seek> JarWriter<'a, W> {
    fn new(inner: W, archive_path: &'a Path, output_dir: &'a Path) -> Result<Self, AssemblyError> {
        let mut writer = Self {
            zip: ZipWriter::new(inner),
            added: HashSet::new(),
            archive_path,
            output_dir,
        };
        writer.add_entry(MANIFEST_ENTRY, MANIFEST_CONTENT.as_bytes())?;
        Ok(writer)
    }

    fn options() -> SimpleFileOptions {
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
    }

    /// Claim an entry name. Returns false when an earlier root already wrote it.
    fn claim(&mut self, name: &str) -> bool {
        if self.added.insert(name.to_string()) {
            true
        } else {
            debug!(entry = name, "Skipping duplicate archive entry");
            false
        }
    }

    fn add_entry(&mut self, name: &str, content: &[u8]) -> Result<(), AssemblyError> {
        if !self.claim(name) {
            return Ok(());
        }
        self.zip
            .start_file(name.to_string(), Self::options())
            .map_err(|e| AssemblyError::archive("start entry", self.archive_path, e))?;
        self.zip
            .write_all(content)
            .map_err(|e| AssemblyError::io("write entry", self.archive_path, e))
    }

    fn add_directory_root(&mut self, root: &Path) -> Result<(), AssemblyError> {
        debug!(root = %root.display(), "Copying directory root");

        let output_dir = self.output_dir;
        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_assembler_output(entry, output_dir));

        for entry in walker {
            let entry = entry.map_err(|e| AssemblyError::io("read directory entry", root, e))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| AssemblyError::io("get relative path", entry.path(), e))?;
            let name = entry_name(relative);

            if name.starts_with(SERVICES_PREFIX) || !self.claim(&name) {
                continue;
            }

            self.zip
                .start_file(name, Self::options())
                .map_err(|e| AssemblyError::archive("start entry", self.archive_path, e))?;
            let mut source = File::open(entry.path())
                .map_err(|e| AssemblyError::io("open file", entry.path(), e))?;
            io::copy(&mut source, &mut self.zip)
                .map_err(|e| AssemblyError::io("copy file", entry.path(), e))?;
        }

        Ok(())
    }

    fn add_jar_root(&mut self, jar: &Path) -> Result<(), AssemblyError> {
        debug!(jar = %jar.display(), "Copying jar root");

        let file = File::open(jar).map_err(|e| AssemblyError::io("open jar", jar, e))?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| AssemblyError::archive("read jar", jar, e))?;

        for index in 0..archive.len() {
            let entry = archive
                .by_index_raw(index)
                .map_err(|e| AssemblyError::archive("read jar entry", jar, e))?;

            let name = entry.name().to_string();
            if entry.is_dir() || name.starts_with(SERVICES_PREFIX) || name == MANIFEST_ENTRY {
                continue;
            }
            if !self.claim(&name) {
                continue;
            }

            self.zip
                .raw_copy_file(entry)
                .map_err(|e| AssemblyError::archive("copy jar entry", jar, e))?;
        }

        Ok(())
    }

    fn add_service_registration(&mut self, modules: &[ModuleReference]) -> Result<(), AssemblyError> {
        let content = modules
            .iter()
            .map(ModuleReference::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        self.add_entry(SERVICE_REGISTRATION_ENTRY, content.as_bytes())
    }

    fn finish(self) -> Result<usize, AssemblyError> {
        let count = self.added.len();
        self.zip
            .finish()
            .map_err(|e| AssemblyError::archive("finish archive", self.archive_path, e))?;
        Ok(count)
    }
}

/// Whether a walked entry is the output directory or an archive written there.
///
/// The output directory itself is pruned when it sits below a root. When it
/// is the root, only archives and partial archives are skipped.
fn is_assembler_output(entry: &walkdir::DirEntry, output_dir: &Path) -> bool {
    let is_output_dir = |path: &Path| fs::canonicalize(path).is_ok_and(|path| path == output_dir);

    if entry.file_type().is_dir() {
        let pruned = entry.depth() > 0 && is_output_dir(entry.path());
        if pruned {
            debug!(dir = %entry.path().display(), "Skipping archive output directory");
        }
        return pruned;
    }

    let name = entry.file_name().to_string_lossy();
    let is_archive = name.starts_with(PARTIAL_PREFIX)
        || (name.starts_with(ARCHIVE_PREFIX) && name.ends_with(".jar"));
    is_archive && entry.path().parent().is_some_and(is_output_dir)
}

/// Archive entry name for a relative path: `/`-separated on every platform.
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
