use std::fs;
use std::path::{Path, PathBuf};

use include_dir::{include_dir, Dir};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static DATA_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/data");

pub const LANGUAGES: [&str; 5] = ["en", "es", "fr", "de", "it"];
pub const WORD_COUNT_BUCKETS: [u32; 4] = [50, 100, 150, 200];
pub const DEFAULT_WORD_COUNT: u32 = 50;

#[derive(Debug, Error)]
pub enum SentenceError {
    #[error("no sentence data for {0}")]
    NotFound(String),
    #[error("sentence data is not valid utf-8: {0}")]
    Encoding(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A selectable time preset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePreset {
    pub id: u32,
    pub duration: u32,
    pub label: String,
}

/// Lookup of candidate sentences by language and word-count bucket
pub trait SentenceSource {
    fn sentences(&self, language: &str, word_count: u32) -> Result<Vec<String>, SentenceError>;
    fn times(&self) -> Result<Vec<TimePreset>, SentenceError>;
}

fn sentence_file(language: &str, word_count: u32) -> String {
    format!("{language}/{word_count}words.json")
}

/// Sentence data compiled into the binary
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedSentences;

impl EmbeddedSentences {
    fn read(&self, path: &str) -> Result<&'static str, SentenceError> {
        let file = DATA_DIR
            .get_file(path)
            .ok_or_else(|| SentenceError::NotFound(path.to_string()))?;

        file.contents_utf8()
            .ok_or_else(|| SentenceError::Encoding(path.to_string()))
    }
}

impl SentenceSource for EmbeddedSentences {
    fn sentences(&self, language: &str, word_count: u32) -> Result<Vec<String>, SentenceError> {
        let contents = self.read(&sentence_file(language, word_count))?;
        Ok(serde_json::from_str(contents)?)
    }

    fn times(&self) -> Result<Vec<TimePreset>, SentenceError> {
        Ok(serde_json::from_str(self.read("times.json")?)?)
    }
}

/// Sentence data read from a directory with the same layout as the embedded set
#[derive(Debug, Clone)]
pub struct DirSentences {
    root: PathBuf,
}

impl DirSentences {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn read(&self, relative: &str) -> Result<Vec<u8>, SentenceError> {
        let path = self.root.join(relative);
        if !path.exists() {
            return Err(SentenceError::NotFound(path.display().to_string()));
        }
        Ok(fs::read(path)?)
    }
}

impl SentenceSource for DirSentences {
    fn sentences(&self, language: &str, word_count: u32) -> Result<Vec<String>, SentenceError> {
        let bytes = self.read(&sentence_file(language, word_count))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn times(&self) -> Result<Vec<TimePreset>, SentenceError> {
        Ok(serde_json::from_slice(&self.read("times.json")?)?)
    }
}

/// Shuffles a copy of the candidates and joins them into one reference text
pub fn reference_text<R: Rng + ?Sized>(sentences: &[String], rng: &mut R) -> String {
    let mut shuffled = sentences.to_vec();
    shuffled.shuffle(rng);
    shuffled.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    #[test]
    fn test_every_language_and_bucket_is_embedded() {
        let source = EmbeddedSentences;
        for language in LANGUAGES {
            for bucket in WORD_COUNT_BUCKETS {
                let sentences = source.sentences(language, bucket).unwrap();
                let words: usize = sentences.iter().map(|s| s.split_whitespace().count()).sum();
                assert!(words >= bucket as usize, "{language}/{bucket}");
            }
        }
    }

    #[test]
    fn test_unknown_language() {
        let result = EmbeddedSentences.sentences("xx", 50);
        assert!(matches!(result, Err(SentenceError::NotFound(_))));
    }

    #[test]
    fn test_embedded_times() {
        let times = EmbeddedSentences.times().unwrap();
        assert_eq!(times[0].duration, 15);
        assert!(times.iter().all(|t| t.duration > 0));
    }

    #[test]
    fn test_reference_text_uses_every_sentence_once() {
        let sentences = vec!["one two.".to_string(), "three.".to_string(), "four five six.".to_string()];
        let mut rng = StdRng::seed_from_u64(7);
        let text = reference_text(&sentences, &mut rng);

        assert_eq!(text.len(), sentences.iter().map(|s| s.len()).sum::<usize>() + 2);
        for sentence in &sentences {
            assert!(text.contains(sentence.as_str()));
        }
    }

    #[test]
    fn test_reference_text_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(reference_text(&[], &mut rng), "");
    }

    #[test]
    fn test_dir_source() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("en")).unwrap();
        fs::write(dir.path().join("en/50words.json"), r#"["a b c.", "d e."]"#).unwrap();
        fs::write(
            dir.path().join("times.json"),
            r#"[{"id": 1, "duration": 45, "label": "45s"}]"#,
        )
        .unwrap();

        let source = DirSentences::new(dir.path());
        assert_eq!(source.sentences("en", 50).unwrap().len(), 2);
        assert_eq!(source.times().unwrap()[0].duration, 45);
        assert!(matches!(source.sentences("en", 100), Err(SentenceError::NotFound(_))));
    }
}
