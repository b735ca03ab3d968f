use crate::config::{verbose_print, Number, State};
use crate::ranker::{Corpus, CorpusSet};
use anyhow::{Context, Result};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::mem::size_of;
use std::path::{Path, PathBuf};

/// Metadata written ahead of the raw vector block in each corpus file.
#[derive(Serialize, Deserialize)]
struct CorpusHeader {
    model: String,
    dimension: usize,
    count: usize,
    dataset_digest: String,
    ids: Vec<String>,
    texts: Vec<String>,
}

/// Provenance of a stored class corpus, used to decide whether regeneration
/// can be skipped.
#[derive(Debug, PartialEq, Eq)]
pub struct StoredFingerprint {
    pub model: String,
    pub dataset_digest: String,
}

/// Per-class embedding cache on disk. Each class persists to one
/// `<label>.corpus` file: a little-endian `u32` header length, a bincode
/// header with ids and texts, then the vectors as raw little-endian `f32`s.
pub struct CorpusStore {
    dir: PathBuf,
    model: String,
}

impl CorpusStore {
    pub fn new(state: &State) -> Self {
        Self {
            dir: PathBuf::from(&state.embeddings_dir),
            model: state.model_name.clone(),
        }
    }

    fn class_path(&self, label: &str) -> PathBuf {
        self.dir.join(format!("{}.corpus", label))
    }

    pub fn save_class(
        &self,
        label: &str,
        ids: Vec<String>,
        texts: Vec<String>,
        vectors: &[Vec<Number>],
        dimension: usize,
        dataset_digest: &str,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("failed to create embeddings directory '{}'", self.dir.display())
        })?;

        let header = CorpusHeader {
            model: self.model.clone(),
            dimension,
            count: vectors.len(),
            dataset_digest: dataset_digest.to_string(),
            ids,
            texts,
        };
        let header_bytes = bincode::serialize(&header).context("failed to encode corpus header")?;

        let path = self.class_path(label);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("failed to create corpus file '{}'", path.display()))?;

        file.write_all(&(header_bytes.len() as u32).to_le_bytes())?;
        file.write_all(&header_bytes)?;
        let mut block = Vec::with_capacity(header.count * dimension * size_of::<Number>());
        for vector in vectors {
            if vector.len() != dimension {
                anyhow::bail!(
                    "refusing to store vector with {} dimensions in a {}-dimension corpus",
                    vector.len(),
                    dimension
                );
            }
            block.extend(vector.iter().flat_map(|&num| num.to_le_bytes()));
        }
        file.write_all(&block)
            .with_context(|| format!("failed to write corpus file '{}'", path.display()))?;

        verbose_print(&format!(
            "Stored {} {} embeddings in '{}'",
            header.count,
            label,
            path.display()
        ));
        Ok(())
    }

    /// Load one class. `Ok(None)` means the corpus file does not exist, which
    /// callers treat as an empty corpus so multi-class search can degrade per
    /// class. Corrupt files and model mismatches are hard errors.
    pub fn load_class(&self, label: &str) -> Result<Option<Corpus>> {
        let path = self.class_path(label);
        let (header, mmap, vectors_offset) = match self.read_header(&path)? {
            Some(parts) => parts,
            None => return Ok(None),
        };

        if header.model != self.model {
            anyhow::bail!(
                "corpus '{}' was generated with model '{}' but '{}' is configured; \
                 re-run generate",
                path.display(),
                header.model,
                self.model
            );
        }
        if header.ids.len() != header.count || header.texts.len() != header.count {
            anyhow::bail!("corrupt corpus header in '{}'", path.display());
        }

        let vector_size = header.dimension * size_of::<Number>();
        let expected_len = vectors_offset + header.count * vector_size;
        if mmap.len() != expected_len {
            anyhow::bail!(
                "corpus file '{}' is {} bytes, expected {}",
                path.display(),
                mmap.len(),
                expected_len
            );
        }

        let mut vectors = Vec::with_capacity(header.count);
        for i in 0..header.count {
            let start = vectors_offset + i * vector_size;
            let vector: Vec<Number> = mmap[start..start + vector_size]
                .chunks_exact(size_of::<Number>())
                .map(|b| Number::from_le_bytes(b.try_into().unwrap()))
                .collect();
            vectors.push(vector);
        }

        let corpus = Corpus::new(header.ids, header.texts, vectors, header.dimension)?;
        verbose_print(&format!(
            "Loaded {} {} embeddings from '{}'",
            corpus.len(),
            label,
            path.display()
        ));
        Ok(Some(corpus))
    }

    /// Read a stored corpus's model and dataset digest without touching the
    /// vector block.
    pub fn stored_fingerprint(&self, label: &str) -> Result<Option<StoredFingerprint>> {
        let path = self.class_path(label);
        Ok(self.read_header(&path)?.map(|(header, _, _)| StoredFingerprint {
            model: header.model,
            dataset_digest: header.dataset_digest,
        }))
    }

    /// Load every class in `labels`, preserving order. Missing classes carry
    /// `None` in the returned set.
    pub fn load_all(&self, labels: &[String]) -> Result<CorpusSet> {
        let mut classes = Vec::with_capacity(labels.len());
        for label in labels {
            let corpus = self.load_class(label)?;
            if corpus.is_none() {
                verbose_print(&format!(
                    "No embeddings found for class '{}'; it will return no results",
                    label
                ));
            }
            classes.push((label.clone(), corpus));
        }
        Ok(CorpusSet::new(classes))
    }

    fn read_header(&self, path: &Path) -> Result<Option<(CorpusHeader, Mmap, usize)>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to open corpus file '{}'", path.display()))
            }
        };
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < size_of::<u32>() {
            anyhow::bail!("corpus file '{}' is truncated", path.display());
        }
        let header_len =
            u32::from_le_bytes(mmap[..size_of::<u32>()].try_into().unwrap()) as usize;
        let vectors_offset = size_of::<u32>() + header_len;
        if mmap.len() < vectors_offset {
            anyhow::bail!("corpus file '{}' is truncated", path.display());
        }

        let header: CorpusHeader = bincode::deserialize(&mmap[size_of::<u32>()..vectors_offset])
            .with_context(|| format!("corrupt corpus header in '{}'", path.display()))?;
        Ok(Some((header, mmap, vectors_offset)))
    }
}

/// SHA-256 of the dataset file, stored alongside each class corpus so stale
/// caches can be detected.
pub fn dataset_digest(path: &Path) -> Result<String> {
    let contents = fs::read(path)
        .with_context(|| format!("failed to read dataset '{}'", path.display()))?;
    let digest = Sha256::digest(&contents);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> CorpusStore {
        CorpusStore {
            dir: dir.to_path_buf(),
            model: "all-MiniLM-L6-v2".to_string(),
        }
    }

    fn sample_vectors() -> Vec<Vec<Number>> {
        vec![vec![1.0, 0.0, 0.5], vec![0.0, 1.0, -0.5]]
    }

    #[test]
    fn round_trips_a_class_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store
            .save_class(
                "smishing",
                vec!["s1".to_string(), "s2".to_string()],
                vec!["free prize".to_string(), "click here".to_string()],
                &sample_vectors(),
                3,
                "digest-1",
            )
            .unwrap();

        let corpus = store.load_class("smishing").unwrap().unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.dimension(), 3);
        assert_eq!(corpus.ids(), ["s1", "s2"]);
        assert_eq!(corpus.texts()[1], "click here");
        assert_eq!(corpus.vectors()[1], vec![0.0, 1.0, -0.5]);
    }

    #[test]
    fn missing_class_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.load_class("benign").unwrap().is_none());
    }

    #[test]
    fn load_all_marks_missing_classes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store
            .save_class(
                "smishing",
                vec!["s1".to_string(), "s2".to_string()],
                vec!["a".to_string(), "b".to_string()],
                &sample_vectors(),
                3,
                "digest-1",
            )
            .unwrap();

        let set = store
            .load_all(&["smishing".to_string(), "benign".to_string()])
            .unwrap();
        assert_eq!(set.loaded_count(), 1);
        let loaded: Vec<bool> = set.classes().map(|(_, c)| c.is_some()).collect();
        assert_eq!(loaded, vec![true, false]);
    }

    #[test]
    fn model_mismatch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        store_in(dir.path())
            .save_class(
                "smishing",
                vec!["s1".to_string(), "s2".to_string()],
                vec!["a".to_string(), "b".to_string()],
                &sample_vectors(),
                3,
                "digest-1",
            )
            .unwrap();

        let other = CorpusStore {
            dir: dir.path().to_path_buf(),
            model: "all-MiniLM-L12-v2".to_string(),
        };
        let err = other.load_class("smishing").unwrap_err();
        assert!(err.to_string().contains("re-run generate"));
    }

    #[test]
    fn truncated_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store
            .save_class(
                "smishing",
                vec!["s1".to_string(), "s2".to_string()],
                vec!["a".to_string(), "b".to_string()],
                &sample_vectors(),
                3,
                "digest-1",
            )
            .unwrap();

        let path = dir.path().join("smishing.corpus");
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();
        assert!(store.load_class("smishing").is_err());
    }

    #[test]
    fn fingerprint_reports_stored_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.stored_fingerprint("smishing").unwrap().is_none());

        store
            .save_class(
                "smishing",
                vec!["s1".to_string(), "s2".to_string()],
                vec!["a".to_string(), "b".to_string()],
                &sample_vectors(),
                3,
                "digest-1",
            )
            .unwrap();
        let fingerprint = store.stored_fingerprint("smishing").unwrap().unwrap();
        assert_eq!(
            fingerprint,
            StoredFingerprint {
                model: "all-MiniLM-L6-v2".to_string(),
                dataset_digest: "digest-1".to_string(),
            }
        );
    }

    #[test]
    fn dataset_digest_is_stable_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "sms_id,sms_text,class\n").unwrap();
        let first = dataset_digest(&path).unwrap();
        assert_eq!(first, dataset_digest(&path).unwrap());
        assert_eq!(first.len(), 64);

        fs::write(&path, "sms_id,sms_text,class\ns1,hi,benign\n").unwrap();
        assert_ne!(first, dataset_digest(&path).unwrap());
    }
}
