//! `vectors.bin`, the on-disk form of the program embeddings.
//!
//! A 47 byte header followed by `entry_count` records, all little-endian:
//!
//! | bytes  | field                                    |
//! |--------|------------------------------------------|
//! | 0      | format version                           |
//! | 1..33  | sha256 of the embedding model name       |
//! | 33..35 | dimensions (u16)                         |
//! | 35..43 | entry count (u64)                        |
//! | 43..47 | crc32 of bytes 0..43                     |
//!
//! Each record is the program id (u64) and `dimensions` f32 values.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::index::VectorIndex;
use crate::storage::write_atomic;

const VERSION: u8 = 1;
const HEADER_LEN: usize = 47;
const CHECKED_LEN: usize = 43;

#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed vector file: {0}")]
    InvalidFormat(String),

    #[error("vector file format {found} is newer than this build understands")]
    UnsupportedVersion { found: u8 },

    #[error("vector file was produced by another embedding model")]
    ModelMismatch,

    #[error("vector file header is corrupted")]
    ChecksumMismatch,

    #[error("vectors have {got} dimensions, deployment uses {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Identifies the embedding model a file was produced with.
pub fn model_id_hash(model: &str) -> [u8; 32] {
    Sha256::digest(model.as_bytes()).into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

impl Header {
    fn encode(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.push(self.version);
        out.extend_from_slice(&self.model_id);
        out.extend_from_slice(&self.dimensions.to_le_bytes());
        out.extend_from_slice(&self.entry_count.to_le_bytes());

        let crc = crc32fast::hash(&out[start..]);
        out.extend_from_slice(&crc.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self, VectorStorageError> {
        let Some(header) = bytes.get(..HEADER_LEN) else {
            return Err(VectorStorageError::InvalidFormat(format!(
                "{} bytes is shorter than the header",
                bytes.len()
            )));
        };

        let version = header[0];
        if version > VERSION {
            return Err(VectorStorageError::UnsupportedVersion { found: version });
        }

        let (checked, crc) = header.split_at(CHECKED_LEN);
        if crc32fast::hash(checked).to_le_bytes() != crc {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        let mut model_id = [0u8; 32];
        model_id.copy_from_slice(&header[1..33]);

        Ok(Self {
            version,
            model_id,
            dimensions: u16::from_le_bytes([header[33], header[34]]),
            entry_count: le_u64(&header[35..43]),
        })
    }
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the file into an index, refusing files of another model or
    /// dimension. Zero-norm records are dropped with a warning.
    pub fn load(&self, model_id: &[u8; 32], dimensions: usize) -> Result<VectorIndex, VectorStorageError> {
        let bytes = std::fs::read(&self.path)?;
        let header = Header::decode(&bytes)?;

        if header.model_id != *model_id {
            return Err(VectorStorageError::ModelMismatch);
        }
        if header.dimensions as usize != dimensions {
            return Err(VectorStorageError::DimensionMismatch {
                expected: dimensions,
                got: header.dimensions as usize,
            });
        }

        let record_len = 8 + 4 * dimensions;
        let body = &bytes[HEADER_LEN..];
        let expected_len = (header.entry_count as usize)
            .checked_mul(record_len)
            .ok_or_else(|| VectorStorageError::InvalidFormat("entry count overflows".to_string()))?;
        if body.len() != expected_len {
            return Err(VectorStorageError::InvalidFormat(format!(
                "{} entries need {expected_len} bytes, found {}",
                header.entry_count,
                body.len()
            )));
        }

        let mut index = VectorIndex::with_capacity(dimensions, header.entry_count as usize);
        for record in body.chunks_exact(record_len) {
            let (id, values) = record.split_at(8);
            let id = le_u64(id);
            let embedding = values
                .chunks_exact(4)
                .map(|v| f32::from_le_bytes([v[0], v[1], v[2], v[3]]))
                .collect();

            if let Err(err) = index.insert(id, embedding) {
                log::warn!("dropping embedding of program {id}: {err}");
            }
        }

        Ok(index)
    }

    /// Replace the file with `index`. Records are written in id order.
    pub fn save(&self, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
        let dimensions = u16::try_from(index.dimensions()).map_err(|_| {
            VectorStorageError::InvalidFormat(format!("{} dimensions exceed the header field", index.dimensions()))
        })?;

        let mut records: Vec<(u64, &[f32])> = index.iter().collect();
        records.sort_unstable_by_key(|(id, _)| *id);

        let mut out = Vec::with_capacity(HEADER_LEN + records.len() * (8 + 4 * index.dimensions()));
        Header {
            version: VERSION,
            model_id: *model_id,
            dimensions,
            entry_count: records.len() as u64,
        }
        .encode(&mut out);

        for (id, embedding) in records {
            out.extend_from_slice(&id.to_le_bytes());
            out.extend(embedding.iter().flat_map(|v| v.to_le_bytes()));
        }

        write_atomic(&self.path, &out)?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct ImportLine {
    id: u64,
    embedding: Vec<f32>,
}

/// Parse the offline pipeline's output, one `{"id", "embedding"}` object per line.
pub fn read_jsonl(reader: impl BufRead, dimensions: usize) -> Result<Vec<(u64, Vec<f32>)>, VectorStorageError> {
    let mut entries = Vec::new();

    for (number, line) in (1..).zip(reader.lines()) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let ImportLine { id, embedding } = serde_json::from_str(&line)
            .map_err(|e| VectorStorageError::InvalidFormat(format!("line {number}: {e}")))?;

        if embedding.len() != dimensions {
            return Err(VectorStorageError::DimensionMismatch {
                expected: dimensions,
                got: embedding.len(),
            });
        }

        entries.push((id, embedding));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, VectorStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("vectors.bin"));
        (dir, storage)
    }

    #[test]
    fn test_model_hash() {
        assert_eq!(model_id_hash("bge-m3"), model_id_hash("bge-m3"));
        assert_ne!(model_id_hash("bge-m3"), model_id_hash("bge-m3-ko"));
    }

    #[test]
    fn test_header_layout() {
        let header = Header {
            version: VERSION,
            model_id: [7; 32],
            dimensions: 1024,
            entry_count: 3,
        };
        let mut out = Vec::new();
        header.encode(&mut out);

        assert_eq!(out.len(), HEADER_LEN);
        assert_eq!(out[33..35], 1024u16.to_le_bytes());
        assert_eq!(Header::decode(&out).unwrap(), header);
    }

    #[test]
    fn test_written_file_reloads() {
        let (dir, storage) = storage();
        let model_id = model_id_hash("bge-m3");

        let mut index = VectorIndex::new(3);
        index.insert(9, vec![0.0, 0.6, 0.8]).unwrap();
        index.insert(2, vec![1.0, 0.0, 0.0]).unwrap();

        storage.save(&index, &model_id).unwrap();
        assert!(storage.exists());

        let bytes = std::fs::read(storage.path()).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 2 * (8 + 12));
        // lowest id first
        assert_eq!(bytes[HEADER_LEN..HEADER_LEN + 8], 2u64.to_le_bytes());

        let loaded = storage.load(&model_id, 3).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(9), Some(&[0.0, 0.6, 0.8][..]));

        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn test_refuses_other_model_and_dimensions() {
        let (_dir, storage) = storage();
        let model_id = model_id_hash("bge-m3");
        storage.save(&VectorIndex::new(3), &model_id).unwrap();

        assert!(matches!(
            storage.load(&model_id_hash("other"), 3),
            Err(VectorStorageError::ModelMismatch)
        ));
        assert!(matches!(
            storage.load(&model_id, 1024),
            Err(VectorStorageError::DimensionMismatch { expected: 1024, got: 3 })
        ));
    }

    #[test]
    fn test_damaged_files() {
        let (_dir, storage) = storage();
        let model_id = model_id_hash("bge-m3");

        let mut index = VectorIndex::new(2);
        index.insert(1, vec![1.0, 0.0]).unwrap();
        storage.save(&index, &model_id).unwrap();
        let bytes = std::fs::read(storage.path()).unwrap();

        let mut flipped = bytes.clone();
        flipped[34] ^= 0xFF;
        std::fs::write(storage.path(), &flipped).unwrap();
        assert!(matches!(
            storage.load(&model_id, 2),
            Err(VectorStorageError::ChecksumMismatch)
        ));

        std::fs::write(storage.path(), &bytes[..10]).unwrap();
        assert!(matches!(
            storage.load(&model_id, 2),
            Err(VectorStorageError::InvalidFormat(_))
        ));

        std::fs::write(storage.path(), &bytes[..bytes.len() - 4]).unwrap();
        assert!(matches!(
            storage.load(&model_id, 2),
            Err(VectorStorageError::InvalidFormat(_))
        ));

        let mut future = bytes.clone();
        future[0] = VERSION + 1;
        std::fs::write(storage.path(), &future).unwrap();
        assert!(matches!(
            storage.load(&model_id, 2),
            Err(VectorStorageError::UnsupportedVersion { found: 2 })
        ));
    }

    #[test]
    fn test_read_jsonl() {
        let input = "{\"id\": 1, \"embedding\": [1.0, 0.0]}\n\n{\"id\": 2, \"embedding\": [0.0, 1.0]}\n";
        let entries = read_jsonl(input.as_bytes(), 2).unwrap();
        assert_eq!(entries, vec![(1, vec![1.0, 0.0]), (2, vec![0.0, 1.0])]);

        let short = "{\"id\": 1, \"embedding\": [1.0]}\n";
        assert!(matches!(
            read_jsonl(short.as_bytes(), 2),
            Err(VectorStorageError::DimensionMismatch { expected: 2, got: 1 })
        ));

        let broken = "\n{\"id\": 1,\n";
        match read_jsonl(broken.as_bytes(), 2) {
            Err(VectorStorageError::InvalidFormat(msg)) => assert!(msg.starts_with("line 2")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
