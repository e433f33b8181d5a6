//! On-disk layout for the vector index and its text sidecar.
//!
//! Two co-located files: a bincode-encoded index (header + flat f32 buffer) and a JSON
//! array of strings, one per vector. Both are written temp-file → fsync → rename so a
//! crash mid-save leaves the previous snapshot in place.

use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::flat::FlatL2Index;
use crate::error::{Result, VigilError};

const MAGIC: [u8; 4] = *b"VGIX";
const FORMAT_VERSION: u32 = 1;

/// Locations of the two files making up one durable index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    pub index: PathBuf,
    pub texts: PathBuf,
}

impl IndexPaths {
    pub fn new(index: impl Into<PathBuf>, texts: impl Into<PathBuf>) -> Self {
        Self {
            index: index.into(),
            texts: texts.into(),
        }
    }

    /// Default file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(
            dir.join("incident_vectors.index"),
            dir.join("incident_texts.json"),
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexHeader {
    magic: [u8; 4],
    version: u32,
    dimension: u32,
    count: u64,
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    header: IndexHeader,
    vectors: &'a [f32],
}

#[derive(Deserialize)]
struct IndexFile {
    header: IndexHeader,
    vectors: Vec<f32>,
}

/// Encode an index into its on-disk byte representation.
pub fn encode_index(index: &FlatL2Index) -> Result<Vec<u8>> {
    let file = IndexFileRef {
        header: IndexHeader {
            magic: MAGIC,
            version: FORMAT_VERSION,
            dimension: index.dimension() as u32,
            count: index.len() as u64,
        },
        vectors: index.raw(),
    };
    Ok(bincode::serialize(&file)?)
}

/// Decode bytes produced by [`encode_index`].
pub fn decode_index(bytes: &[u8]) -> Result<FlatL2Index> {
    let file: IndexFile = bincode::deserialize(bytes)?;
    check_header(&file.header)?;
    let index = FlatL2Index::from_raw(file.header.dimension as usize, file.vectors)?;
    if index.len() as u64 != file.header.count {
        return Err(VigilError::Codec(format!(
            "header declares {} vectors, buffer holds {}",
            file.header.count,
            index.len()
        )));
    }
    Ok(index)
}

fn check_header(header: &IndexHeader) -> Result<()> {
    if header.magic != MAGIC {
        return Err(VigilError::Codec("not a vigil index file".into()));
    }
    if header.version != FORMAT_VERSION {
        return Err(VigilError::Codec(format!(
            "unsupported index format version {}",
            header.version
        )));
    }
    Ok(())
}

/// Read only the header of an index file: `(dimension, vector count)`.
pub fn read_header(path: &Path) -> Result<(usize, usize)> {
    let file = File::open(path).map_err(|e| VigilError::persistence(path, e))?;
    let header: IndexHeader = bincode::deserialize_from(BufReader::new(file))?;
    check_header(&header)?;
    Ok((header.dimension as usize, header.count as usize))
}

/// Write `bytes` to `path` without ever exposing a partially written file.
///
/// The data goes to a uniquely named temp file in the same directory, is fsynced, and
/// is renamed over the target. On unix the directory entry is fsynced as well.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".into());
    let tmp = dir.join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()));

    let result = (|| -> std::io::Result<()> {
        fs::create_dir_all(&dir)?;
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)?;
        sync_dir(&dir)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(VigilError::persistence(path, e));
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Persist an index and its sidecar. The index file is replaced first, then the texts.
pub fn save_snapshot(paths: &IndexPaths, index: &FlatL2Index, texts: &[String]) -> Result<()> {
    let index_bytes = encode_index(index)?;
    let texts_bytes = serde_json::to_vec(texts)?;
    atomic_write(&paths.index, &index_bytes)?;
    atomic_write(&paths.texts, &texts_bytes)?;
    Ok(())
}

/// Load a snapshot, falling back to an empty index whenever the files cannot be trusted.
///
/// - missing index file: empty index
/// - unreadable/corrupt index file: empty index (logged at error)
/// - dimension differs from `dimension`: empty index (logged at warn)
/// - sidecar length differs from vector count: both truncated to the shorter
pub fn load_snapshot(paths: &IndexPaths, dimension: usize) -> (FlatL2Index, Vec<String>) {
    if !paths.index.exists() {
        tracing::info!(path = %paths.index.display(), "no index file, creating new index");
        return (FlatL2Index::new(dimension), Vec::new());
    }

    let index = match fs::read(&paths.index)
        .map_err(|e| VigilError::persistence(&paths.index, e))
        .and_then(|bytes| decode_index(&bytes))
    {
        Ok(index) => index,
        Err(e) => {
            tracing::error!(path = %paths.index.display(), error = %e, "index file unreadable, starting empty");
            return (FlatL2Index::new(dimension), Vec::new());
        }
    };

    if index.dimension() != dimension {
        tracing::warn!(
            stored = index.dimension(),
            configured = dimension,
            "index dimension mismatch, creating new index"
        );
        return (FlatL2Index::new(dimension), Vec::new());
    }

    let texts: Vec<String> = match fs::read(&paths.texts) {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(texts) => texts,
            Err(e) => {
                tracing::error!(path = %paths.texts.display(), error = %e, "text sidecar unreadable");
                Vec::new()
            }
        },
        Err(e) => {
            tracing::warn!(path = %paths.texts.display(), error = %e, "text sidecar missing");
            Vec::new()
        }
    };

    reconcile(index, texts)
}

fn reconcile(mut index: FlatL2Index, mut texts: Vec<String>) -> (FlatL2Index, Vec<String>) {
    if index.len() != texts.len() {
        let keep = index.len().min(texts.len());
        tracing::warn!(
            vectors = index.len(),
            texts = texts.len(),
            keep,
            "index and sidecar disagree, truncating to the shorter"
        );
        index.truncate(keep);
        texts.truncate(keep);
    }
    tracing::info!(vectors = index.len(), "loaded index snapshot");
    (index, texts)
}

/// On-disk facts about an index, for `stats` and `doctor`.
#[derive(Debug, Serialize)]
pub struct SnapshotInfo {
    pub index_exists: bool,
    pub texts_exists: bool,
    pub index_bytes: u64,
    pub texts_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_count: Option<usize>,
    pub problems: Vec<String>,
}

impl SnapshotInfo {
    pub fn is_consistent(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Inspect the files without loading the whole index.
pub fn inspect(paths: &IndexPaths, expected_dimension: usize) -> SnapshotInfo {
    let size = |p: &Path| fs::metadata(p).map(|m| m.len()).unwrap_or(0);
    let mut info = SnapshotInfo {
        index_exists: paths.index.exists(),
        texts_exists: paths.texts.exists(),
        index_bytes: size(&paths.index),
        texts_bytes: size(&paths.texts),
        dimension: None,
        vector_count: None,
        text_count: None,
        problems: Vec::new(),
    };

    if info.index_exists {
        match read_header(&paths.index) {
            Ok((dimension, count)) => {
                info.dimension = Some(dimension);
                info.vector_count = Some(count);
                if dimension != expected_dimension {
                    info.problems.push(format!(
                        "index dimension {dimension} differs from configured {expected_dimension}"
                    ));
                }
            }
            Err(e) => info.problems.push(format!("index header unreadable: {e}")),
        }
    }

    if info.texts_exists {
        match fs::read(&paths.texts)
            .map_err(|e| VigilError::persistence(&paths.texts, e))
            .and_then(|b| Ok(serde_json::from_slice::<Vec<String>>(&b)?))
        {
            Ok(texts) => info.text_count = Some(texts.len()),
            Err(e) => info.problems.push(format!("text sidecar unreadable: {e}")),
        }
    } else if info.index_exists {
        info.problems.push("text sidecar missing".into());
    }

    if let (Some(v), Some(t)) = (info.vector_count, info.text_count) {
        if v != t {
            info.problems
                .push(format!("{v} vectors but {t} sidecar texts"));
        }
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_index() -> FlatL2Index {
        let mut index = FlatL2Index::new(3);
        index.add(&[1.0, 0.0, 0.0]).unwrap();
        index.add(&[0.0, 1.0, 0.0]).unwrap();
        index
    }

    #[test]
    fn encode_decode_preserves_vectors() {
        let index = sample_index();
        let decoded = decode_index(&encode_index(&index).unwrap()).unwrap();
        assert_eq!(decoded, index);
    }

    #[test]
    fn decode_rejects_foreign_bytes() {
        assert!(decode_index(b"definitely not an index").is_err());
    }

    #[test]
    fn atomic_write_replaces_and_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.bin");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        let entries: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn atomic_write_creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("deeper").join("data.bin");
        atomic_write(&path, b"x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn load_missing_files_gives_empty_index() {
        let tmp = TempDir::new().unwrap();
        let (index, texts) = load_snapshot(&IndexPaths::in_dir(tmp.path()), 3);
        assert!(index.is_empty());
        assert_eq!(index.dimension(), 3);
        assert!(texts.is_empty());
    }

    #[test]
    fn load_with_dimension_mismatch_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let paths = IndexPaths::in_dir(tmp.path());
        save_snapshot(&paths, &sample_index(), &["a".into(), "b".into()]).unwrap();

        let (index, texts) = load_snapshot(&paths, 8);
        assert!(index.is_empty());
        assert_eq!(index.dimension(), 8);
        assert!(texts.is_empty());
    }

    #[test]
    fn load_truncates_to_shorter_of_index_and_sidecar() {
        let tmp = TempDir::new().unwrap();
        let paths = IndexPaths::in_dir(tmp.path());
        save_snapshot(&paths, &sample_index(), &["only-one".into()]).unwrap();

        let (index, texts) = load_snapshot(&paths, 3);
        assert_eq!(index.len(), 1);
        assert_eq!(texts, vec!["only-one".to_string()]);
    }

    #[test]
    fn inspect_reports_header_and_mismatch() {
        let tmp = TempDir::new().unwrap();
        let paths = IndexPaths::in_dir(tmp.path());
        save_snapshot(&paths, &sample_index(), &["a".into()]).unwrap();

        let info = inspect(&paths, 3);
        assert_eq!(info.dimension, Some(3));
        assert_eq!(info.vector_count, Some(2));
        assert_eq!(info.text_count, Some(1));
        assert!(!info.is_consistent());

        save_snapshot(&paths, &sample_index(), &["a".into(), "b".into()]).unwrap();
        assert!(inspect(&paths, 3).is_consistent());
    }
}
