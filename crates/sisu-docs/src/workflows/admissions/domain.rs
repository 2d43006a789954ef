use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::cpf::Cpf;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

identifier!(CampusId);
identifier!(CourseId);
identifier!(SecretariatId);
identifier!(
    /// Database id of a candidate; never the enrollment number.
    CandidateId
);
identifier!(DocumentId);
identifier!(StaffUserId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campus {
    pub id: CampusId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub campus_id: CampusId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCourse {
    pub name: String,
    pub campus_id: CampusId,
}

/// Reviewing authority for one course at one campus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secretariat {
    pub id: SecretariatId,
    pub name: String,
    pub email: String,
    pub course_id: CourseId,
    pub campus_id: CampusId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSecretariat {
    pub name: String,
    pub email: String,
    pub course_id: CourseId,
    pub campus_id: CampusId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Sex {
    pub fn from_code(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "M" | "MASCULINO" => Some(Self::Male),
            "F" | "FEMININO" => Some(Self::Female),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
        }
    }
}

/// Affirmative-action category derived from the first token of the modality code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    NonQuota,
    PublicSchool,
    EthnicQuota,
    Disability,
}

impl Modality {
    /// Unknown codes fall back to the non-quota set.
    pub fn from_code(code: &str) -> Self {
        match code {
            "EEP" => Self::PublicSchool,
            "PPI" => Self::EthnicQuota,
            "PCD" => Self::Disability,
            _ => Self::NonQuota,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::NonQuota => "NC",
            Self::PublicSchool => "EEP",
            Self::EthnicQuota => "PPI",
            Self::Disability => "PCD",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub enrollment: String,
    pub name: String,
    pub email: String,
    pub cpf: Cpf,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<Sex>,
    pub phone_primary: Option<String>,
    pub phone_secondary: Option<String>,
    pub state: Option<String>,
    pub municipality: Option<String>,
    pub campus_id: CampusId,
    pub course_id: CourseId,
    pub shift: Option<String>,
    pub education: Option<String>,
    pub modality: Option<String>,
    pub registered_at: DateTime<Utc>,
}

impl Candidate {
    pub fn modality_kind(&self) -> Modality {
        super::provisioning::modality_for(self.modality.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCandidate {
    pub enrollment: String,
    pub name: String,
    pub email: String,
    pub cpf: Cpf,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<Sex>,
    pub phone_primary: Option<String>,
    pub phone_secondary: Option<String>,
    pub state: Option<String>,
    pub municipality: Option<String>,
    pub campus_id: CampusId,
    pub course_id: CourseId,
    pub shift: Option<String>,
    pub education: Option<String>,
    pub modality: Option<String>,
}

/// Document types a candidate can be asked for. Rows written by older releases keep
/// their raw key in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentKind {
    ElementarySchoolTranscript,
    HighSchoolTranscript,
    HighSchoolDiploma,
    ElectoralClearance,
    BirthOrMarriageCertificate,
    MilitaryService,
    Cpf,
    IdentityDocument,
    ForeignerIdentityCard,
    SocialProfileDeclaration,
    IndigenousEthnicityDeclaration,
    Other(String),
}

impl DocumentKind {
    pub const RECOGNIZED: [DocumentKind; 11] = [
        DocumentKind::ElementarySchoolTranscript,
        DocumentKind::HighSchoolTranscript,
        DocumentKind::HighSchoolDiploma,
        DocumentKind::ElectoralClearance,
        DocumentKind::BirthOrMarriageCertificate,
        DocumentKind::MilitaryService,
        DocumentKind::Cpf,
        DocumentKind::IdentityDocument,
        DocumentKind::ForeignerIdentityCard,
        DocumentKind::SocialProfileDeclaration,
        DocumentKind::IndigenousEthnicityDeclaration,
    ];

    /// Keys written by earlier document sets and removed by maintenance.
    pub const OBSOLETE_KEYS: [&'static str; 6] = [
        "certificado_conclusao",
        "comprovante_residencia",
        "foto_3x4",
        "historico_escolar",
        "rg",
        "titulo_eleitor",
    ];

    pub fn from_key(key: &str) -> Self {
        let key = key.trim();
        Self::RECOGNIZED
            .into_iter()
            .find(|kind| kind.key() == key)
            .unwrap_or_else(|| Self::Other(key.to_string()))
    }

    /// Parses a key, rejecting anything outside the recognized set.
    pub fn recognized(key: &str) -> Option<Self> {
        match Self::from_key(key) {
            Self::Other(_) => None,
            kind => Some(kind),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::ElementarySchoolTranscript => "historico_fundamental",
            Self::HighSchoolTranscript => "historico_medio",
            Self::HighSchoolDiploma => "diploma_certificado",
            Self::ElectoralClearance => "quitacao_eleitoral",
            Self::BirthOrMarriageCertificate => "certidao_nascimento",
            Self::MilitaryService => "reservista",
            Self::Cpf => "cpf",
            Self::IdentityDocument => "documento_identificacao",
            Self::ForeignerIdentityCard => "cie",
            Self::SocialProfileDeclaration => "declaracao_perfil",
            Self::IndigenousEthnicityDeclaration => "declaracao_etnia",
            Self::Other(key) => key,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::ElementarySchoolTranscript => "Histórico Escolar do Ensino Fundamental",
            Self::HighSchoolTranscript => "Histórico Escolar do Ensino Médio",
            Self::HighSchoolDiploma => "Diploma ou Certificado de Conclusão do Ensino Médio",
            Self::ElectoralClearance => "Certidão de Quitação Eleitoral",
            Self::BirthOrMarriageCertificate => "Certidão de Nascimento ou Casamento",
            Self::MilitaryService => {
                "Carteira de Reservista ou Certificado de Alistamento Militar"
            }
            Self::Cpf => "Cadastro de Pessoa Física – CPF",
            Self::IdentityDocument => "Documento Oficial de Identificação",
            Self::ForeignerIdentityCard => "Carteira de Identidade de Estrangeiro - CIE",
            Self::SocialProfileDeclaration => {
                "Declaração de Perfil Social e Autenticidade dos Documentos Enviados"
            }
            Self::IndigenousEthnicityDeclaration => {
                "Declaração de Etnia e Vínculo com Comunidade Indígena"
            }
            Self::Other(key) => key,
        }
    }

    pub fn is_obsolete(&self) -> bool {
        Self::OBSOLETE_KEYS.contains(&self.key())
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for DocumentKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for DocumentKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_key(&raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    NotSent,
    AwaitingValidation,
    Approved,
    Rejected,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 4] = [
        DocumentStatus::NotSent,
        DocumentStatus::AwaitingValidation,
        DocumentStatus::Approved,
        DocumentStatus::Rejected,
    ];

    /// Stored and displayed label.
    pub fn label(self) -> &'static str {
        match self {
            Self::NotSent => "Não enviado",
            Self::AwaitingValidation => "Aguardando Validação",
            Self::Approved => "Aprovado",
            Self::Rejected => "Recusado",
        }
    }

    /// Accepts the stored label or the snake_case API name.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        Self::ALL.into_iter().find(|status| {
            status.label().eq_ignore_ascii_case(trimmed) || status.api_name() == trimmed
        })
    }

    pub fn api_name(self) -> &'static str {
        match self {
            Self::NotSent => "not_sent",
            Self::AwaitingValidation => "awaiting_validation",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Self::Approved => "✅",
            Self::Rejected => "❌",
            Self::AwaitingValidation => "⏳",
            Self::NotSent => "⚠️",
        }
    }

    /// Candidates may only withdraw documents that are not under review or accepted.
    pub fn allows_removal(self) -> bool {
        matches!(self, Self::NotSent | Self::Rejected)
    }

    pub fn is_outstanding(self) -> bool {
        matches!(self, Self::NotSent | Self::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub candidate_id: CandidateId,
    pub kind: DocumentKind,
    pub name: String,
    pub required: bool,
    pub file_name: Option<String>,
    /// File name as sent by the candidate.
    pub original_name: Option<String>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub status: DocumentStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub reviewed_by: Option<StaffUserId>,
}

impl DocumentRecord {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.kind.label()
        } else {
            &self.name
        }
    }
}

/// One placeholder row to create for a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRequirement {
    pub kind: DocumentKind,
    pub name: String,
    pub required: bool,
}

impl DocumentRequirement {
    pub fn new(kind: DocumentKind, required: bool) -> Self {
        let name = kind.label().to_string();
        Self {
            kind,
            name,
            required,
        }
    }
}

/// Per-status counts across one candidate's documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusBreakdown {
    pub total: usize,
    pub approved: usize,
    pub awaiting: usize,
    pub rejected: usize,
    pub not_sent: usize,
}

impl StatusBreakdown {
    pub fn from_documents<'a>(documents: impl IntoIterator<Item = &'a DocumentRecord>) -> Self {
        let mut breakdown = Self::default();
        for document in documents {
            breakdown.total += 1;
            match document.status {
                DocumentStatus::Approved => breakdown.approved += 1,
                DocumentStatus::AwaitingValidation => breakdown.awaiting += 1,
                DocumentStatus::Rejected => breakdown.rejected += 1,
                DocumentStatus::NotSent => breakdown.not_sent += 1,
            }
        }
        breakdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_kind_round_trips_known_and_legacy_keys() {
        for kind in DocumentKind::RECOGNIZED {
            assert_eq!(DocumentKind::from_key(kind.key()), kind);
        }
        assert_eq!(
            DocumentKind::from_key("foto_3x4"),
            DocumentKind::Other("foto_3x4".to_string())
        );
        assert!(DocumentKind::from_key("rg").is_obsolete());
        assert!(DocumentKind::recognized("comprovante_residencia").is_none());
    }

    #[test]
    fn status_parses_labels_and_api_names() {
        assert_eq!(
            DocumentStatus::parse("Aguardando Validação"),
            Some(DocumentStatus::AwaitingValidation)
        );
        assert_eq!(
            DocumentStatus::parse("rejected"),
            Some(DocumentStatus::Rejected)
        );
        assert_eq!(DocumentStatus::parse("archived"), None);
    }

    #[test]
    fn sex_accepts_codes_and_words() {
        assert_eq!(Sex::from_code(" m "), Some(Sex::Male));
        assert_eq!(Sex::from_code("Feminino"), Some(Sex::Female));
        assert_eq!(Sex::from_code(""), None);
    }
}
