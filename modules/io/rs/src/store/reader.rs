use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use eyre::{bail, ensure, eyre, OptionExt, Result, WrapErr};
use flate2::read::DeflateDecoder;

use super::components;
use super::format::{
    elements, Array, Attr, DType, Kind, Node, Values, HEADER_SIZE, MAGIC, MAX_LINK_DEPTH,
    TRAILER_MAGIC, TRAILER_SIZE, VERSION,
};

/// Read-only view of a finished container. Only the catalog is kept in memory,
/// dataset payloads are read on demand.
pub struct Reader {
    path: PathBuf,
    file: Mutex<File>,
    catalog: BTreeMap<String, Node>,
    // Dataset payloads live in [HEADER_SIZE, catalog_offset)
    catalog_offset: u64,
}

impl Reader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file =
            File::open(&path).wrap_err_with(|| format!("Failed to open {}", path.display()))?;
        let size = file.metadata()?.len();
        ensure!(
            size >= HEADER_SIZE + TRAILER_SIZE,
            "{} is too small to be a container",
            path.display()
        );

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        ensure!(
            &header[..8] == MAGIC,
            "{} is not a container (bad magic)",
            path.display()
        );
        let version = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        ensure!(
            version == VERSION,
            "Unsupported container version {version} in {}",
            path.display()
        );

        let mut trailer = [0u8; TRAILER_SIZE as usize];
        file.seek(SeekFrom::Start(size - TRAILER_SIZE))?;
        file.read_exact(&mut trailer)?;
        ensure!(
            &trailer[16..] == TRAILER_MAGIC,
            "{} is truncated or unfinished (bad trailer)",
            path.display()
        );
        let mut word = [0u8; 8];
        word.copy_from_slice(&trailer[..8]);
        let offset = u64::from_le_bytes(word);
        word.copy_from_slice(&trailer[8..16]);
        let length = u64::from_le_bytes(word);
        ensure!(
            offset >= HEADER_SIZE && offset.checked_add(length) == Some(size - TRAILER_SIZE),
            "Corrupted catalog location in {}",
            path.display()
        );

        let mut catalog = vec![0u8; length as usize];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut catalog)?;
        let catalog: BTreeMap<String, Node> = bitcode::decode(&catalog)
            .wrap_err_with(|| format!("Failed to decode the catalog of {}", path.display()))?;
        ensure!(
            matches!(catalog.get("/"), Some(Node::Group { .. })),
            "{} has no root group",
            path.display()
        );

        Ok(Self {
            path,
            file: Mutex::new(file),
            catalog,
            catalog_offset: offset,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self, path: &str) -> bool {
        self.resolve_with(path, false, 0).is_ok()
    }

    /// Kind of the entry itself: soft links are reported as links, not as their targets.
    pub fn kind(&self, path: &str) -> Result<Kind> {
        let resolved = self.resolve_with(path, false, 0)?;
        Ok(self.node(&resolved)?.kind())
    }

    /// Target of a soft link, None for other entries.
    pub fn link_target(&self, path: &str) -> Result<Option<&str>> {
        let resolved = self.resolve_with(path, false, 0)?;
        match self.node(&resolved)? {
            Node::SoftLink { target } => Ok(Some(target)),
            _ => Ok(None),
        }
    }

    /// Canonical path of the entry after following every soft link.
    pub fn resolve(&self, path: &str) -> Result<String> {
        self.resolve_with(path, true, 0)
    }

    fn resolve_with(&self, path: &str, follow_last: bool, depth: usize) -> Result<String> {
        ensure!(
            depth <= MAX_LINK_DEPTH,
            "Too many levels of soft links while resolving {path}"
        );

        let components = components(path)?;
        let mut current = String::new();
        for (ind, component) in components.iter().enumerate() {
            let candidate = format!("{current}/{component}");
            let last = ind + 1 == components.len();
            match self.catalog.get(&candidate) {
                None => bail!("Entry {candidate} doesn't exist"),
                Some(Node::SoftLink { target }) if !last || follow_last => {
                    current = self.resolve_with(target, true, depth + 1)?;
                    if current == "/" {
                        current.clear();
                    }
                }
                Some(Node::Dataset { .. }) if !last => {
                    bail!("{candidate} is a dataset, not a group")
                }
                Some(_) => current = candidate,
            }
        }

        if current.is_empty() {
            current.push('/');
        }
        Ok(current)
    }

    fn node(&self, resolved: &str) -> Result<&Node> {
        self.catalog
            .get(resolved)
            .ok_or_eyre(format!("Entry {resolved} doesn't exist"))
    }

    /// Names of the group members in sorted order. Links are listed, not followed.
    pub fn members(&self, path: &str) -> Result<Vec<&str>> {
        let group = self.resolve(path)?;
        ensure!(
            matches!(self.node(&group)?, Node::Group { .. }),
            "{path} is not a group"
        );

        let prefix = if group == "/" {
            "/".to_owned()
        } else {
            format!("{group}/")
        };
        let members = self
            .catalog
            .range(prefix.clone()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(&prefix))
            .filter_map(|key| {
                let name = &key[prefix.len()..];
                (!name.is_empty() && !name.contains('/')).then_some(name)
            })
            .collect();
        Ok(members)
    }

    pub fn attrs(&self, path: &str) -> Result<&BTreeMap<String, Attr>> {
        let resolved = self.resolve(path)?;
        match self.node(&resolved)? {
            Node::Group { attrs } => Ok(attrs),
            node => bail!("{path} is a {:?}, only groups carry attributes", node.kind()),
        }
    }

    pub fn attr(&self, path: &str, key: &str) -> Result<&Attr> {
        self.attrs(path)?
            .get(key)
            .ok_or_eyre(format!("Attribute {key} is missing on {path}"))
    }

    /// Type and shape of a dataset without reading its payload.
    pub fn dataset_info(&self, path: &str) -> Result<(DType, Vec<usize>)> {
        let resolved = self.resolve(path)?;
        match self.node(&resolved)? {
            Node::Dataset { dtype, shape, .. } => {
                Ok((*dtype, shape.iter().map(|x| *x as usize).collect()))
            }
            node => bail!("{path} is a {:?}, not a dataset", node.kind()),
        }
    }

    pub fn read_dataset(&self, path: &str) -> Result<Array> {
        let resolved = self.resolve(path)?;
        let (dtype, shape, offset, length, compressed) = match self.node(&resolved)? {
            Node::Dataset {
                dtype,
                shape,
                offset,
                length,
                compressed,
            } => (*dtype, shape, *offset, *length, *compressed),
            node => bail!("{path} is a {:?}, not a dataset", node.kind()),
        };

        ensure!(
            offset >= HEADER_SIZE
                && offset
                    .checked_add(length)
                    .is_some_and(|end| end <= self.catalog_offset),
            "Corrupted location of dataset {resolved} in {}",
            self.path.display()
        );

        let mut payload = vec![0u8; length as usize];
        {
            let mut file = self
                .file
                .lock()
                .map_err(|_| eyre!("Container file handle is poisoned"))?;
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut payload)
                .wrap_err_with(|| format!("Failed to read dataset {resolved}"))?;
        }

        if compressed {
            let mut decoded = Vec::new();
            DeflateDecoder::new(payload.as_slice())
                .read_to_end(&mut decoded)
                .wrap_err_with(|| format!("Failed to decompress dataset {resolved}"))?;
            payload = decoded;
        }

        let values: Values = bitcode::decode(&payload)
            .wrap_err_with(|| format!("Failed to decode dataset {resolved}"))?;
        ensure!(
            values.dtype() == dtype && elements(shape) == Some(values.len() as u64),
            "Dataset {resolved} doesn't match its catalog entry"
        );

        Ok(Array {
            shape: shape.iter().map(|x| *x as usize).collect(),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::Writer;
    use super::*;

    fn sample(path: &Path, compression: u32) -> Result<()> {
        let mut writer = Writer::create(path)?.with_compression(compression)?;
        writer.set_attr("/", "dataset", "sample")?;
        writer.set_attr("/", "min_read_length", 10u64)?;
        writer.write_dataset("/GENE1/sample/reads/data", &[2, 3], vec![1u64, 2, 3, 4, 5, 6])?;
        writer.write_dataset("/GENE1/sample/reads/buffer_left", &[], vec![-5i64])?;
        writer.create_group("/GENE2/sample")?;
        writer.link_soft("/GENE1", "/ALIAS1")?;
        writer.finish()?;
        Ok(())
    }

    #[test]
    fn test_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for compression in [0, 6] {
            let path = dir.path().join(format!("out-{compression}.rps"));
            sample(&path, compression)?;
            assert!(!Writer::partial_path(&path)?.exists());

            let reader = Reader::open(&path)?;
            assert_eq!(reader.attr("/", "dataset")?, &Attr::Str("sample".to_owned()));
            assert_eq!(reader.attr("/", "min_read_length")?, &Attr::UInt(10));
            assert_eq!(reader.members("/")?, vec!["ALIAS1", "GENE1", "GENE2"]);
            assert_eq!(reader.members("/GENE1/sample/reads")?, vec!["buffer_left", "data"]);

            assert_eq!(
                reader.dataset_info("/GENE1/sample/reads/data")?,
                (DType::U64, vec![2, 3])
            );
            let data = reader.read_dataset("/GENE1/sample/reads/data")?;
            assert_eq!(data.shape, vec![2, 3]);
            assert_eq!(data.as_u64()?, &[1u64, 2, 3, 4, 5, 6]);
            assert!(data.as_i64().is_err());

            let scalar = reader.read_dataset("/GENE1/sample/reads/buffer_left")?;
            assert_eq!(scalar.scalar_i64()?, -5);
        }
        Ok(())
    }

    #[test]
    fn test_soft_links() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.rps");
        sample(&path, 4)?;

        let reader = Reader::open(&path)?;
        assert_eq!(reader.kind("/GENE1")?, Kind::Group);
        assert_eq!(reader.kind("/ALIAS1")?, Kind::SoftLink);
        assert_eq!(reader.kind("/ALIAS1/sample/reads/data")?, Kind::Dataset);
        assert_eq!(reader.link_target("/ALIAS1")?, Some("/GENE1"));
        assert_eq!(reader.link_target("/GENE1")?, None);
        assert_eq!(reader.resolve("/ALIAS1/sample")?, "/GENE1/sample");
        assert_eq!(reader.members("/ALIAS1")?, vec!["sample"]);
        assert_eq!(
            reader.read_dataset("/ALIAS1/sample/reads/data")?,
            reader.read_dataset("/GENE1/sample/reads/data")?
        );
        assert!(!reader.exists("/ALIAS2"));
        assert!(reader.read_dataset("/GENE1/sample/reads/data/x").is_err());
        Ok(())
    }

    #[test]
    fn test_writer_errors() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.rps");
        let mut writer = Writer::create(&path)?;

        assert!(Writer::create(dir.path().join("other.rps"))?
            .with_compression(10)
            .is_err());
        assert!(writer.write_dataset("/a/b", &[3], vec![1u64, 2]).is_err());
        writer.write_dataset("/a/b", &[2], vec![1u64, 2])?;
        assert!(writer.write_dataset("/a/b", &[2], vec![1u64, 2]).is_err());
        assert!(writer.create_group("/a/b/c").is_err());
        assert!(writer.set_attr("/a/b", "key", 1i64).is_err());
        assert!(writer.link_soft("/missing", "/link").is_err());
        assert!(writer.link_soft("/a", "/a/b").is_err());
        writer.abort();
        assert!(!Writer::partial_path(&path)?.exists());
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_partial_file_lock() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.rps");

        let writer = Writer::create(&path)?;
        assert!(writer.partial().exists());
        assert!(!path.exists());
        assert!(Writer::create(&path).is_err());

        drop(writer);
        assert!(!Writer::partial_path(&path)?.exists());
        let writer = Writer::create(&path)?;
        writer.finish()?;
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn test_rejects_unfinished_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.rps");
        std::fs::write(&path, b"RPSTORE\0\x01\0\0\0 definitely not a trailer")?;
        assert!(Reader::open(&path).is_err());

        std::fs::write(&path, b"garbage")?;
        assert!(Reader::open(&path).is_err());
        Ok(())
    }

    fn with_catalog(entries: Vec<(&str, Node)>) -> Vec<u8> {
        let mut catalog: BTreeMap<String, Node> = BTreeMap::new();
        catalog.insert(
            "/".to_owned(),
            Node::Group {
                attrs: BTreeMap::new(),
            },
        );
        for (path, node) in entries {
            catalog.insert(path.to_owned(), node);
        }
        let catalog = bitcode::encode(&catalog);

        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&catalog);
        bytes.extend_from_slice(&HEADER_SIZE.to_le_bytes());
        bytes.extend_from_slice(&(catalog.len() as u64).to_le_bytes());
        bytes.extend_from_slice(TRAILER_MAGIC);
        bytes
    }

    #[test]
    fn test_rejects_datasets_outside_the_payload_area() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("corrupted.rps");
        let dataset = |offset, length| Node::Dataset {
            dtype: DType::U64,
            shape: vec![1],
            offset,
            length,
            compressed: false,
        };
        std::fs::write(
            &path,
            with_catalog(vec![
                ("/huge", dataset(HEADER_SIZE, u64::MAX / 2)),
                ("/wrapping", dataset(u64::MAX, 2)),
                ("/header", dataset(0, 4)),
                ("/catalog", dataset(HEADER_SIZE, 1)),
            ]),
        )?;

        let reader = Reader::open(&path)?;
        assert_eq!(reader.dataset_info("/huge")?, (DType::U64, vec![1]));
        for dataset in ["/huge", "/wrapping", "/header", "/catalog"] {
            let err = reader.read_dataset(dataset).unwrap_err();
            assert!(
                err.to_string().starts_with("Corrupted location of dataset"),
                "{dataset}: {err}"
            );
        }
        Ok(())
    }
}
