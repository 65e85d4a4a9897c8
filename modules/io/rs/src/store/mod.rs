// Single-file hierarchical container:
//
// magic    b"RPSTORE\0"
// version  u32 LE
// blobs    dataset payloads: bitcode-encoded values, optionally raw-deflate compressed
// catalog  bitcode-encoded BTreeMap<path, Node>
// trailer  catalog offset u64 LE, catalog length u64 LE, b"RPSTEND\0"
//
// Paths are absolute, '/'-separated; the root group is "/".
// Soft links store the absolute target path and are resolved at read time.

mod format;
mod reader;
mod writer;

pub use format::{Array, Attr, DType, Kind, Node, Values};
pub use reader::Reader;
pub use writer::Writer;

/// Canonical form of an absolute container path.
pub fn normalize(path: &str) -> eyre::Result<String> {
    let components = components(path)?;
    if components.is_empty() {
        Ok("/".to_owned())
    } else {
        Ok(format!("/{}", components.join("/")))
    }
}

pub(crate) fn components(path: &str) -> eyre::Result<Vec<&str>> {
    eyre::ensure!(
        path.starts_with('/'),
        "Container paths must be absolute: {path}"
    );
    let components = path.split('/').filter(|x| !x.is_empty()).collect::<Vec<_>>();
    eyre::ensure!(
        components.iter().all(|x| *x != "." && *x != ".."),
        "Relative components are not allowed in container paths: {path}"
    );
    Ok(components)
}

/// Parent of a normalized path, None for the root.
pub(crate) fn parent(path: &str) -> Option<&str> {
    match path.rfind('/') {
        _ if path == "/" => None,
        Some(0) => Some("/"),
        Some(ind) => Some(&path[..ind]),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() -> eyre::Result<()> {
        assert_eq!(normalize("/")?, "/");
        assert_eq!(normalize("//a//b/")?, "/a/b");
        assert!(normalize("a/b").is_err());
        assert!(normalize("/a/../b").is_err());
        Ok(())
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent("/"), None);
        assert_eq!(parent("/a"), Some("/"));
        assert_eq!(parent("/a/b/c"), Some("/a/b"));
    }
}
