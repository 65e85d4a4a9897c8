use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use eyre::{bail, ensure, eyre, OptionExt, Result, WrapErr};
use flate2::write::DeflateEncoder;

use super::format::{elements, Attr, Node, Values, MAGIC, TRAILER_MAGIC, VERSION};
use super::{normalize, parent};

/// Writes a container into `.<name>.partial` next to the final path and moves it into place on
/// `finish`. The partial file is created exclusively, so it doubles as a write lock. Dropping an
/// unfinished writer removes it.
pub struct Writer {
    path: PathBuf,
    partial: PathBuf,
    file: Option<BufWriter<File>>,
    offset: u64,
    catalog: BTreeMap<String, Node>,
    compression: u32,
}

impl Writer {
    pub fn partial_path(path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .ok_or_eyre(format!("Output path has no file name: {}", path.display()))?;

        let mut partial = std::ffi::OsString::from(".");
        partial.push(name);
        partial.push(".partial");
        Ok(path.with_file_name(partial))
    }

    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let partial = Self::partial_path(&path)?;

        let file = match OpenOptions::new().write(true).create_new(true).open(&partial) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => bail!(
                "{} is locked by another writer (remove {} if no other run is active)",
                path.display(),
                partial.display()
            ),
            Err(err) => {
                return Err(err).wrap_err_with(|| format!("Failed to create {}", partial.display()))
            }
        };

        let mut writer = Self {
            path,
            partial,
            file: Some(BufWriter::new(file)),
            offset: 0,
            catalog: BTreeMap::new(),
            compression: 0,
        };
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.catalog.insert(
            "/".to_owned(),
            Node::Group {
                attrs: BTreeMap::new(),
            },
        );
        Ok(writer)
    }

    /// Deflate level for dataset payloads, 0 stores them as is.
    pub fn with_compression(mut self, level: u32) -> Result<Self> {
        ensure!(level <= 9, "Compression level must be in [0, 9], got {level}");
        self.compression = level;
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn partial(&self) -> &Path {
        &self.partial
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_eyre("The container is already closed")?;
        file.write_all(bytes)
            .wrap_err_with(|| format!("Failed to write to {}", self.partial.display()))?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    /// Create the group and any missing parents. Existing groups are left untouched.
    pub fn create_group(&mut self, path: &str) -> Result<()> {
        let path = normalize(path)?;
        let mut current = String::new();
        for component in super::components(&path)? {
            current.push('/');
            current.push_str(component);
            match self.catalog.get(&current) {
                None => {
                    self.catalog.insert(
                        current.clone(),
                        Node::Group {
                            attrs: BTreeMap::new(),
                        },
                    );
                }
                Some(Node::Group { .. }) => {}
                Some(node) => bail!("{current} already exists as a {:?}", node.kind()),
            }
        }
        Ok(())
    }

    pub fn set_attr(&mut self, path: &str, key: &str, value: impl Into<Attr>) -> Result<()> {
        let path = normalize(path)?;
        match self.catalog.get_mut(&path) {
            Some(Node::Group { attrs }) => {
                attrs.insert(key.to_owned(), value.into());
                Ok(())
            }
            Some(node) => bail!("Attributes can only be set on groups, {path} is a {:?}", node.kind()),
            None => bail!("Group {path} doesn't exist"),
        }
    }

    fn reserve(&mut self, path: &str) -> Result<String> {
        let path = normalize(path)?;
        ensure!(path != "/", "The root group can't be replaced");
        ensure!(
            !self.catalog.contains_key(&path),
            "Entry {path} already exists"
        );
        if let Some(parent) = parent(&path) {
            self.create_group(parent)?;
        }
        Ok(path)
    }

    /// Write a row-major dataset with the given shape. An empty shape denotes a scalar.
    pub fn write_dataset(
        &mut self,
        path: &str,
        shape: &[usize],
        values: impl Into<Values>,
    ) -> Result<()> {
        let values = values.into();
        let shape = shape.iter().map(|x| *x as u64).collect::<Vec<_>>();
        ensure!(
            elements(&shape) == Some(values.len() as u64),
            "Dataset {path}: shape {shape:?} doesn't match {} values",
            values.len()
        );
        let path = self.reserve(path)?;

        let encoded = bitcode::encode(&values);
        let (payload, compressed) = if self.compression > 0 {
            let mut encoder =
                DeflateEncoder::new(Vec::new(), flate2::Compression::new(self.compression));
            encoder.write_all(&encoded)?;
            (encoder.finish()?, true)
        } else {
            (encoded, false)
        };

        let offset = self.offset;
        self.write_all(&payload)
            .wrap_err_with(|| format!("Failed to write dataset {path}"))?;
        self.catalog.insert(
            path,
            Node::Dataset {
                dtype: values.dtype(),
                shape,
                offset,
                length: payload.len() as u64,
                compressed,
            },
        );
        Ok(())
    }

    /// Create a soft link at `link` pointing to the existing entry `target`.
    pub fn link_soft(&mut self, target: &str, link: &str) -> Result<()> {
        let target = normalize(target)?;
        ensure!(
            self.catalog.contains_key(&target),
            "Soft link target {target} doesn't exist"
        );
        let link = self.reserve(link)?;
        self.catalog.insert(link, Node::SoftLink { target });
        Ok(())
    }

    pub fn contains(&self, path: &str) -> bool {
        normalize(path)
            .map(|x| self.catalog.contains_key(&x))
            .unwrap_or(false)
    }

    /// Write the catalog and trailer, sync, and move the file into its final place.
    pub fn finish(mut self) -> Result<PathBuf> {
        let catalog = bitcode::encode(&self.catalog);
        let offset = self.offset;

        self.write_all(&catalog)?;
        self.write_all(&offset.to_le_bytes())?;
        self.write_all(&(catalog.len() as u64).to_le_bytes())?;
        self.write_all(TRAILER_MAGIC)?;

        let file = self
            .file
            .take()
            .ok_or_eyre("The container is already closed")?
            .into_inner()
            .map_err(|err| eyre!("Failed to flush {}: {}", self.partial.display(), err.error()))?;
        file.sync_all()
            .wrap_err_with(|| format!("Failed to sync {}", self.partial.display()))?;
        drop(file);

        std::fs::rename(&self.partial, &self.path).wrap_err_with(|| {
            format!(
                "Failed to move {} to {}",
                self.partial.display(),
                self.path.display()
            )
        })?;
        // Nothing left to clean up on drop
        self.partial = PathBuf::new();
        Ok(self.path.clone())
    }

    /// Discard everything written so far.
    pub fn abort(self) {
        drop(self)
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        self.file.take();
        if self.partial.as_os_str().is_empty() {
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.partial) {
            if err.kind() != ErrorKind::NotFound {
                log::warn!(
                    "Failed to remove the partial container {}: {}",
                    self.partial.display(),
                    err
                );
            }
        }
    }
}
