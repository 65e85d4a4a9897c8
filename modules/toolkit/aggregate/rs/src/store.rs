use std::path::{Path, PathBuf};

use eyre::{ensure, eyre, WrapErr};
use riboprof_io_rs::store::{Array, Attr, Kind, Reader};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::layout::{self, Field};
use crate::profile::{GeneProfile, Matrix};

/// Read access to a finished profile container.
pub struct ProfileStore {
    path: PathBuf,
    dataset: String,
    reader: Reader,
}

impl ProfileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = Reader::open(&path).map_err(|err| Error::storage(&path, err))?;
        let dataset = match reader.attr("/", "dataset") {
            Ok(Attr::Str(dataset)) => dataset.clone(),
            Ok(other) => {
                return Err(Error::storage(
                    &path,
                    eyre!("root attribute dataset has an unexpected type: {other:?}"),
                ))
            }
            Err(err) => return Err(Error::storage(&path, err)),
        };
        Ok(Self {
            path,
            dataset,
            reader,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn reader(&self) -> &Reader {
        &self.reader
    }

    fn storage(&self, err: eyre::Report) -> Error {
        Error::storage(&self.path, err)
    }

    /// Run parameters recorded at the container root.
    pub fn config(&self) -> Result<Config> {
        let attrs = self.reader.attrs("/").map_err(|err| self.storage(err))?;
        layout::config_from_attrs(attrs)
            .map_err(|reason| Error::storage(&self.path, eyre!(reason)))?
            .build()
    }

    pub fn attr(&self, key: &str) -> Result<&Attr> {
        self.reader.attr("/", key).map_err(|err| self.storage(err))
    }

    /// Names of all top-level entries, primary and alias alike, in sorted order.
    pub fn entries(&self) -> Result<Vec<String>> {
        let members = self.reader.members("/").map_err(|err| self.storage(err))?;
        Ok(members.into_iter().map(str::to_owned).collect())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.reader.exists(&layout::gene(id))
    }

    pub fn is_alias(&self, id: &str) -> Result<bool> {
        let kind = self
            .reader
            .kind(&layout::gene(id))
            .map_err(|err| self.storage(err))?;
        Ok(kind == Kind::SoftLink)
    }

    /// Identifier an alias points to, None for primary entries.
    pub fn alias_target(&self, id: &str) -> Result<Option<String>> {
        let target = self
            .reader
            .link_target(&layout::gene(id))
            .map_err(|err| self.storage(err))?;
        Ok(target.map(|x| x.trim_start_matches('/').to_owned()))
    }

    /// Read a single field without touching the others.
    pub fn read_field(&self, id: &str, field: Field) -> Result<Array> {
        self.reader
            .read_dataset(&layout::field(id, &self.dataset, field))
            .map_err(|err| self.storage(err))
    }

    pub fn reads_total(&self, id: &str) -> Result<u64> {
        self.read_field(id, Field::ReadsTotal)?
            .scalar_u64()
            .map_err(|err| self.storage(err))
    }

    /// Read all fields of a gene, following aliases.
    pub fn read(&self, id: &str) -> Result<GeneProfile> {
        self._read(id)
            .wrap_err_with(|| format!("Failed to read the profile of {id}"))
            .map_err(|err| self.storage(err))
    }

    fn _read(&self, id: &str) -> eyre::Result<GeneProfile> {
        let dataset = |field| {
            self.reader
                .read_dataset(&layout::field(id, &self.dataset, field))
        };
        let codon = |field| -> eyre::Result<[i64; 3]> {
            let array = dataset(field)?;
            match (array.shape.as_slice(), array.as_i64()?) {
                ([3], [a, b, c]) => Ok([*a, *b, *c]),
                _ => Err(eyre!("{} must hold 3 values", Field::name(&field))),
            }
        };

        let data = dataset(Field::Data)?;
        let matrix = match data.shape.as_slice() {
            [rows, cols] => Matrix::from_values(*rows, *cols, data.as_u64()?.to_vec()),
            _ => None,
        }
        .ok_or_else(|| eyre!("data must be a 2D matrix, got shape {:?}", data.shape))?;

        let lengths = dataset(Field::Lengths)?.as_i64()?.to_vec();
        let reads_by_len = dataset(Field::ReadsByLen)?.as_u64()?.to_vec();
        ensure!(
            lengths.len() == matrix.shape().0 && reads_by_len.len() == matrix.shape().0,
            "lengths and reads_by_len must have one value per matrix row"
        );

        Ok(GeneProfile {
            data: matrix,
            buffer_left: dataset(Field::BufferLeft)?.scalar_i64()?,
            buffer_right: dataset(Field::BufferRight)?.scalar_i64()?,
            start_codon_pos: codon(Field::StartCodonPos)?,
            stop_codon_pos: codon(Field::StopCodonPos)?,
            lengths,
            reads_by_len,
            reads_total: dataset(Field::ReadsTotal)?.scalar_u64()?,
        })
    }
}
