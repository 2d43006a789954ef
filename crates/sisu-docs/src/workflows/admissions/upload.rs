use std::path::Path;

/// A file part received from the candidate portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadRejection {
    #[error("Apenas arquivos PDF são permitidos.")]
    NotPdf,
    #[error("O arquivo deve ter a extensão .pdf.")]
    WrongExtension,
    #[error(
        "O arquivo é muito grande. Tamanho máximo permitido: {} MB.",
        .max_bytes / (1024 * 1024)
    )]
    TooLarge { max_bytes: u64 },
    #[error("O arquivo está vazio.")]
    Empty,
}

/// Checks the declared MIME type, the extension and the size ceiling, in that order.
pub fn validate_upload(file: &UploadedFile, max_bytes: u64) -> Result<(), UploadRejection> {
    let declared = file
        .content_type
        .as_deref()
        .and_then(|raw| raw.parse::<mime::Mime>().ok());
    let is_pdf = declared
        .map(|mime| mime.essence_str() == mime::APPLICATION_PDF.essence_str())
        .unwrap_or(false);
    if !is_pdf {
        return Err(UploadRejection::NotPdf);
    }

    let extension = Path::new(&file.file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    if extension.as_deref() != Some("pdf") {
        return Err(UploadRejection::WrongExtension);
    }

    if file.size() > max_bytes {
        return Err(UploadRejection::TooLarge { max_bytes });
    }
    if file.bytes.is_empty() {
        return Err(UploadRejection::Empty);
    }

    Ok(())
}

/// Base name of the client-supplied file name, without any directory the browser sent.
pub fn original_file_name(raw: &str) -> String {
    raw.rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(name: &str, content_type: &str, size: usize) -> UploadedFile {
        UploadedFile {
            file_name: name.to_string(),
            content_type: Some(content_type.to_string()),
            bytes: vec![b'%'; size],
        }
    }

    #[test]
    fn accepts_pdf_within_limit() {
        assert_eq!(validate_upload(&pdf("rg.PDF", "application/pdf", 10), 10), Ok(()));
    }

    #[test]
    fn rejects_non_pdf_mime_even_with_pdf_name() {
        let file = pdf("scan.pdf", "image/png", 10);
        assert_eq!(validate_upload(&file, 100), Err(UploadRejection::NotPdf));

        let missing = UploadedFile {
            content_type: None,
            ..pdf("scan.pdf", "application/pdf", 10)
        };
        assert_eq!(validate_upload(&missing, 100), Err(UploadRejection::NotPdf));
    }

    #[test]
    fn rejects_pdf_mime_with_other_extension() {
        let file = pdf("scan.exe", "application/pdf", 10);
        assert_eq!(
            validate_upload(&file, 100),
            Err(UploadRejection::WrongExtension)
        );
    }

    #[test]
    fn rejects_oversized_and_empty_files() {
        let big = pdf("a.pdf", "application/pdf", 11);
        assert!(matches!(
            validate_upload(&big, 10),
            Err(UploadRejection::TooLarge { .. })
        ));
        let empty = pdf("a.pdf", "application/pdf", 0);
        assert_eq!(validate_upload(&empty, 10), Err(UploadRejection::Empty));
    }

    #[test]
    fn mime_parameters_are_ignored() {
        let file = pdf("a.pdf", "application/pdf; charset=binary", 3);
        assert_eq!(validate_upload(&file, 10), Ok(()));
    }

    #[test]
    fn original_name_drops_client_directories() {
        assert_eq!(original_file_name("meu_cpf_scan.pdf"), "meu_cpf_scan.pdf");
        assert_eq!(original_file_name("C:\\fakepath\\rg frente.pdf"), "rg frente.pdf");
        assert_eq!(original_file_name("scans/2025/cpf.pdf"), "cpf.pdf");
    }
}
