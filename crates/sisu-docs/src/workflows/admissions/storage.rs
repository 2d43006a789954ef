//! On-disk storage for submitted PDFs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use deunicode::deunicode_with_tofu;
use tokio::fs;
use tracing::debug;

use super::domain::CandidateId;

/// Files generated inside the upload directory that are not candidate documents.
pub const PROTECTION_FILES: [&str; 2] = [".htaccess", "index.html"];
const DENY_RULES: &str = "Order deny,allow\nDeny from all\n";
const STAGING_SUFFIX: &str = ".part";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub file_name: String,
    pub path: String,
    pub size: i64,
}

/// Bytes written under a temporary name until the document row points at them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub staged_name: String,
    pub file: StoredFile,
}

pub fn staging_name(file_name: &str) -> String {
    format!("{file_name}{STAGING_SUFFIX}")
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid stored file name '{0}'")]
    InvalidName(String),
    #[error("stored file '{0}' not found")]
    NotFound(String),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Writes the bytes beside `file_name`, leaving any file of that name untouched.
    async fn stage(&self, file_name: &str, bytes: &[u8]) -> Result<StagedFile, StorageError>;
    /// Moves a staged file over its final name.
    async fn commit(&self, staged: &StagedFile) -> Result<(), StorageError>;
    async fn read(&self, file_name: &str) -> Result<Vec<u8>, StorageError>;
    async fn remove(&self, file_name: &str) -> Result<(), StorageError>;
    /// Names of stored documents, excluding protection files.
    async fn list(&self) -> Result<Vec<String>, StorageError>;
}

pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    /// Creates the directory and its deny-all rule files when missing.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        let rules = root.join(PROTECTION_FILES[0]);
        if fs::metadata(&rules).await.is_err() {
            fs::write(&rules, DENY_RULES).await?;
        }
        let index = root.join(PROTECTION_FILES[1]);
        if fs::metadata(&index).await.is_err() {
            fs::write(&index, "").await?;
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, file_name: &str) -> Result<PathBuf, StorageError> {
        if !is_safe_file_name(file_name) {
            return Err(StorageError::InvalidName(file_name.to_string()));
        }
        Ok(self.root.join(file_name))
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn stage(&self, file_name: &str, bytes: &[u8]) -> Result<StagedFile, StorageError> {
        let path = self.resolve(file_name)?;
        let staged_name = staging_name(file_name);
        fs::write(self.resolve(&staged_name)?, bytes).await?;
        debug!(file = file_name, size = bytes.len(), "staged document");
        Ok(StagedFile {
            staged_name,
            file: StoredFile {
                file_name: file_name.to_string(),
                path: path.to_string_lossy().into_owned(),
                size: bytes.len() as i64,
            },
        })
    }

    async fn commit(&self, staged: &StagedFile) -> Result<(), StorageError> {
        let from = self.resolve(&staged.staged_name)?;
        let to = self.resolve(&staged.file.file_name)?;
        match fs::rename(&from, &to).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(staged.staged_name.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn read(&self, file_name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(file_name)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(file_name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn remove(&self, file_name: &str) -> Result<(), StorageError> {
        let path = self.resolve(file_name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(file_name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !PROTECTION_FILES.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

fn is_safe_file_name(file_name: &str) -> bool {
    !file_name.is_empty()
        && !file_name.starts_with('.')
        && !PROTECTION_FILES.contains(&file_name)
        && file_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// `<CANDIDATE>_<DOCUMENT>_<ENROLLMENT>.pdf`, ASCII only.
pub fn document_file_name(
    candidate_name: &str,
    candidate_id: CandidateId,
    document_label: &str,
    enrollment: &str,
) -> String {
    let mut name = sanitize_segment(candidate_name);
    if name.is_empty() {
        name = format!("CANDIDATO_{candidate_id}");
    }
    let document = sanitize_segment(document_label);
    let enrollment = sanitize_segment(enrollment);

    [name, document, enrollment]
        .into_iter()
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        + ".pdf"
}

/// Transliterates to ASCII, upper-cases, drops punctuation and joins words with `_`.
pub fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = deunicode_with_tofu(raw, "")
        .to_ascii_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '_')
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();

    let mut collapsed = String::with_capacity(cleaned.len());
    for c in cleaned.chars() {
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_ascii_file_names() {
        let name = document_file_name(
            "Maria da Conceição",
            CandidateId(9),
            "Certidão de Nascimento ou Casamento",
            "251234567890",
        );
        assert_eq!(
            name,
            "MARIA_DA_CONCEICAO_CERTIDAO_DE_NASCIMENTO_OU_CASAMENTO_251234567890.pdf"
        );
    }

    #[test]
    fn drops_punctuation_and_collapses_separators() {
        assert_eq!(
            sanitize_segment("Cadastro de Pessoa Física – CPF"),
            "CADASTRO_DE_PESSOA_FISICA_CPF"
        );
        assert_eq!(sanitize_segment("  João   D'Ávila  "), "JOAO_DAVILA");
    }

    #[test]
    fn transliterates_letters_outside_portuguese() {
        assert_eq!(sanitize_segment("Søren Øster Straße"), "SOREN_OSTER_STRASSE");
        assert_eq!(sanitize_segment("Æsa Œuvre"), "AESA_OEUVRE");
    }

    #[test]
    fn empty_candidate_name_falls_back_to_id() {
        let name = document_file_name("¿?", CandidateId(12), "CPF", "99");
        assert_eq!(name, "CANDIDATO_12_CPF_99.pdf");
    }

    #[test]
    fn rejects_path_like_names() {
        assert!(!is_safe_file_name("../etc/passwd"));
        assert!(!is_safe_file_name(".htaccess"));
        assert!(!is_safe_file_name("a/b.pdf"));
        assert!(is_safe_file_name("JOAO_CPF_1.pdf"));
    }

    #[tokio::test]
    async fn fs_store_writes_protection_and_lists_documents() {
        let root = std::env::temp_dir().join(format!(
            "sisu-docs-store-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let store = FsDocumentStore::open(&root).await.expect("store opens");
        assert!(root.join(".htaccess").exists());

        let staged = store
            .stage("JOAO_CPF_1.pdf", b"%PDF-1.4 test")
            .await
            .expect("writes");
        assert_eq!(staged.file.size, 13);
        assert_eq!(staged.staged_name, "JOAO_CPF_1.pdf.part");
        assert!(matches!(
            store.read("JOAO_CPF_1.pdf").await,
            Err(StorageError::NotFound(_))
        ));
        store.commit(&staged).await.expect("commits");
        assert_eq!(store.list().await.expect("lists"), vec!["JOAO_CPF_1.pdf"]);
        assert_eq!(
            store.read("JOAO_CPF_1.pdf").await.expect("reads"),
            b"%PDF-1.4 test".to_vec()
        );

        store.remove("JOAO_CPF_1.pdf").await.expect("removes");
        assert!(matches!(
            store.remove("JOAO_CPF_1.pdf").await,
            Err(StorageError::NotFound(_))
        ));
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn staged_file_replaces_only_on_commit() {
        let root = std::env::temp_dir().join(format!(
            "sisu-docs-stage-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let store = FsDocumentStore::open(&root).await.expect("store opens");
        let first = store.stage("ANA_CPF_1.pdf", b"%PDF-1.4 old").await.expect("stages");
        store.commit(&first).await.expect("commits");

        let second = store.stage("ANA_CPF_1.pdf", b"%PDF-1.4 new").await.expect("stages");
        assert_eq!(store.read("ANA_CPF_1.pdf").await.expect("reads"), b"%PDF-1.4 old".to_vec());
        store.remove(&second.staged_name).await.expect("discards");
        assert_eq!(store.read("ANA_CPF_1.pdf").await.expect("reads"), b"%PDF-1.4 old".to_vec());

        let third = store.stage("ANA_CPF_1.pdf", b"%PDF-1.4 new").await.expect("stages");
        store.commit(&third).await.expect("commits");
        assert_eq!(store.read("ANA_CPF_1.pdf").await.expect("reads"), b"%PDF-1.4 new".to_vec());
        assert_eq!(store.list().await.expect("lists"), vec!["ANA_CPF_1.pdf"]);
        std::fs::remove_dir_all(&root).ok();
    }
}
