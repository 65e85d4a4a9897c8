use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use eyre::{ensure, Result, WrapErr};
use flate2::read::MultiGzDecoder;

pub enum DecompressedStream {
    PlainText(File),
    Gzip(MultiGzDecoder<File>),
}

impl DecompressedStream {
    pub fn box_read(self) -> Box<dyn Read + Send + Sync + 'static> {
        match self {
            DecompressedStream::PlainText(file) => Box::new(file),
            DecompressedStream::Gzip(decoder) => Box::new(decoder),
        }
    }

    pub fn box_bufread(self) -> Box<dyn BufRead + Send + Sync + 'static> {
        match self {
            DecompressedStream::PlainText(file) => Box::new(BufReader::new(file)),
            DecompressedStream::Gzip(decoder) => Box::new(BufReader::new(decoder)),
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, DecompressedStream::Gzip(_))
    }
}

/// Open a file, transparently decompressing it when its signature says it's gzipped.
pub fn read_file(path: impl AsRef<Path>) -> Result<DecompressedStream> {
    let path = path.as_ref();
    ensure!(path.exists(), "File {} does not exist", path.display());

    let open = || File::open(path).wrap_err_with(|| format!("Failed to open {}", path.display()));
    let kind = infer::get_from_path(path)
        .wrap_err_with(|| format!("Failed to sniff the file type of {}", path.display()))?;

    let stream = match kind.map(|x| (x.extension(), x.mime_type())) {
        Some(("gz", "application/gzip")) => DecompressedStream::Gzip(MultiGzDecoder::new(open()?)),
        // Always assume plain text if there is no clear match
        _ => DecompressedStream::PlainText(open()?),
    };
    Ok(stream)
}
