//! Default document set per admission modality.

use super::domain::{DocumentKind, DocumentRequirement, Modality, Sex};

/// First token of a modality label such as `"PPI - Pretos, pardos e indígenas"`.
pub fn modality_code(raw: Option<&str>) -> String {
    let code = raw
        .unwrap_or_default()
        .split('-')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_uppercase();
    if code.is_empty() {
        Modality::NonQuota.code().to_string()
    } else {
        code
    }
}

pub fn modality_for(raw: Option<&str>) -> Modality {
    Modality::from_code(&modality_code(raw))
}

/// Placeholder rows created together with a candidate.
///
/// A missing sex is treated as male so the military certificate row is never skipped
/// for lack of data.
pub fn required_documents(modality: Modality, sex: Option<Sex>) -> Vec<DocumentRequirement> {
    let mut documents = vec![
        DocumentRequirement::new(DocumentKind::IdentityDocument, true),
        DocumentRequirement::new(DocumentKind::Cpf, true),
        DocumentRequirement::new(DocumentKind::BirthOrMarriageCertificate, true),
        DocumentRequirement::new(DocumentKind::HighSchoolTranscript, true),
        DocumentRequirement::new(DocumentKind::HighSchoolDiploma, true),
        DocumentRequirement::new(DocumentKind::SocialProfileDeclaration, true),
        DocumentRequirement::new(DocumentKind::ForeignerIdentityCard, false),
    ];

    match modality {
        Modality::NonQuota => {
            documents.push(DocumentRequirement::new(
                DocumentKind::ElectoralClearance,
                true,
            ));
        }
        Modality::PublicSchool => {
            documents.push(DocumentRequirement::new(
                DocumentKind::ElementarySchoolTranscript,
                true,
            ));
        }
        Modality::EthnicQuota => {
            documents.push(DocumentRequirement::new(
                DocumentKind::IndigenousEthnicityDeclaration,
                true,
            ));
        }
        Modality::Disability => {}
    }

    if sex.unwrap_or(Sex::Male) == Sex::Male {
        documents.push(DocumentRequirement::new(
            DocumentKind::MilitaryService,
            false,
        ));
    }

    documents
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(requirements: &[DocumentRequirement]) -> Vec<&str> {
        requirements.iter().map(|r| r.kind.key()).collect()
    }

    #[test]
    fn extracts_code_from_labels() {
        assert_eq!(modality_code(Some(" ppi - Pretos e pardos")), "PPI");
        assert_eq!(modality_code(Some("EEP")), "EEP");
        assert_eq!(modality_code(Some("")), "NC");
        assert_eq!(modality_code(None), "NC");
    }

    #[test]
    fn unknown_codes_use_non_quota_set() {
        assert_eq!(modality_for(Some("L1 - Renda")), Modality::NonQuota);
        assert_eq!(modality_for(Some("PCD - Deficiência")), Modality::Disability);
    }

    #[test]
    fn non_quota_male_includes_electoral_and_military_rows() {
        let documents = required_documents(Modality::NonQuota, Some(Sex::Male));
        let keys = kinds(&documents);
        assert!(keys.contains(&"quitacao_eleitoral"));
        assert!(keys.contains(&"reservista"));
        let military = documents
            .iter()
            .find(|r| r.kind == DocumentKind::MilitaryService)
            .expect("military row");
        assert!(!military.required);
    }

    #[test]
    fn female_candidates_skip_military_row() {
        let documents = required_documents(Modality::EthnicQuota, Some(Sex::Female));
        let keys = kinds(&documents);
        assert!(!keys.contains(&"reservista"));
        assert!(keys.contains(&"declaracao_etnia"));
    }

    #[test]
    fn missing_sex_defaults_to_male_rows() {
        let documents = required_documents(Modality::Disability, None);
        assert!(kinds(&documents).contains(&"reservista"));
    }

    #[test]
    fn public_school_requires_elementary_transcript() {
        let documents = required_documents(Modality::PublicSchool, Some(Sex::Female));
        let keys = kinds(&documents);
        assert!(keys.contains(&"historico_fundamental"));
        assert!(!keys.contains(&"quitacao_eleitoral"));
    }

    #[test]
    fn every_set_uses_distinct_recognized_kinds() {
        for modality in [
            Modality::NonQuota,
            Modality::PublicSchool,
            Modality::EthnicQuota,
            Modality::Disability,
        ] {
            let documents = required_documents(modality, Some(Sex::Male));
            let mut keys = kinds(&documents);
            keys.sort();
            keys.dedup();
            assert_eq!(keys.len(), documents.len());
            assert!(documents
                .iter()
                .all(|r| DocumentKind::recognized(r.kind.key()).is_some()));
        }
    }
}
