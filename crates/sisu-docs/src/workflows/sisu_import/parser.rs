use std::io::Read;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use validator::ValidateEmail;

use crate::workflows::admissions::cpf::Cpf;
use crate::workflows::admissions::domain::Sex;

/// Columns without which no row is imported.
pub(crate) const REQUIRED_COLUMNS: [&str; 6] = [
    "NO_CAMPUS",
    "NO_CURSO",
    "CO_INSCRICAO_ENEM",
    "NO_INSCRITO",
    "NU_CPF_INSCRITO",
    "DS_EMAIL",
];

#[derive(Debug)]
pub(crate) enum SheetError {
    Empty,
    MissingColumns(Vec<&'static str>),
    Csv(csv::Error),
}

/// Rows keyed by their line number in the file (the header is line 1).
#[derive(Debug)]
pub(crate) struct Sheet {
    pub(crate) rows: Vec<(usize, Result<SisuRow, String>)>,
}

pub(crate) fn parse_sheet<R: Read>(reader: R) -> Result<Sheet, SheetError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers().map_err(SheetError::Csv)?.clone();
    if headers.iter().all(|column| column.trim().is_empty()) {
        return Err(SheetError::Empty);
    }
    let missing: Vec<&'static str> = REQUIRED_COLUMNS
        .into_iter()
        .filter(|required| !headers.iter().any(|column| column.trim() == *required))
        .collect();
    if !missing.is_empty() {
        return Err(SheetError::MissingColumns(missing));
    }

    let rows = csv_reader
        .deserialize::<SisuRow>()
        .enumerate()
        .map(|(index, row)| (index + 2, row.map_err(|err| err.to_string())))
        .collect();
    Ok(Sheet { rows })
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SisuRow {
    #[serde(rename = "NO_CAMPUS", default, deserialize_with = "empty_string_as_none")]
    campus: Option<String>,
    #[serde(rename = "NO_CURSO", default, deserialize_with = "empty_string_as_none")]
    course: Option<String>,
    #[serde(rename = "DS_TURNO", default, deserialize_with = "empty_string_as_none")]
    shift: Option<String>,
    #[serde(rename = "DS_FORMACAO", default, deserialize_with = "empty_string_as_none")]
    education: Option<String>,
    #[serde(
        rename = "CO_INSCRICAO_ENEM",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    enrollment: Option<String>,
    #[serde(rename = "NO_INSCRITO", default, deserialize_with = "empty_string_as_none")]
    name: Option<String>,
    #[serde(
        rename = "NU_CPF_INSCRITO",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    cpf: Option<String>,
    #[serde(
        rename = "DT_NASCIMENTO",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    birth_date: Option<String>,
    #[serde(rename = "TP_SEXO", default, deserialize_with = "empty_string_as_none")]
    sex: Option<String>,
    #[serde(
        rename = "SG_UF_INSCRITO",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    state: Option<String>,
    #[serde(rename = "NO_MUNICIPIO", default, deserialize_with = "empty_string_as_none")]
    municipality: Option<String>,
    #[serde(rename = "NU_FONE1", default, deserialize_with = "empty_string_as_none")]
    phone_primary: Option<String>,
    #[serde(rename = "NU_FONE2", default, deserialize_with = "empty_string_as_none")]
    phone_secondary: Option<String>,
    #[serde(rename = "DS_EMAIL", default, deserialize_with = "empty_string_as_none")]
    email: Option<String>,
    #[serde(
        rename = "MODALIDADE_ESCOLHIDA",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    modality: Option<String>,
}

/// A row whose fields passed validation; campus and course are still names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CandidateRow {
    pub(crate) campus: String,
    pub(crate) course: String,
    pub(crate) shift: Option<String>,
    pub(crate) education: Option<String>,
    pub(crate) enrollment: String,
    pub(crate) name: String,
    pub(crate) cpf: Cpf,
    pub(crate) birth_date: Option<NaiveDate>,
    pub(crate) sex: Option<Sex>,
    pub(crate) state: Option<String>,
    pub(crate) municipality: Option<String>,
    pub(crate) phone_primary: Option<String>,
    pub(crate) phone_secondary: Option<String>,
    pub(crate) email: String,
    pub(crate) modality: Option<String>,
}

impl SisuRow {
    /// Collects every problem of the row instead of stopping at the first one.
    pub(crate) fn validate(self) -> Result<CandidateRow, Vec<String>> {
        let mut errors = Vec::new();

        for (value, field) in [
            (&self.enrollment, "inscricao"),
            (&self.name, "nome"),
            (&self.email, "email"),
            (&self.cpf, "cpf"),
            (&self.campus, "campus"),
            (&self.course, "curso"),
        ] {
            if value.is_none() {
                errors.push(format!("Campo obrigatório vazio: {field}"));
            }
        }

        if let Some(email) = self.email.as_deref() {
            if !email.validate_email() {
                errors.push(format!("Email inválido: {email}"));
            }
        }

        let cpf = match self.cpf.as_deref() {
            Some(raw) => match Cpf::parse(raw) {
                Ok(cpf) => Some(cpf),
                Err(_) => {
                    errors.push(format!("CPF inválido: {raw}"));
                    None
                }
            },
            None => None,
        };

        let birth_date = match self.birth_date.as_deref() {
            Some(raw) => match parse_birth_date(raw) {
                Some(date) => Some(date),
                None => {
                    errors.push(format!("Data de nascimento inválida: {raw}"));
                    None
                }
            },
            None => None,
        };

        match (
            errors.is_empty(),
            self.enrollment,
            self.name,
            self.email,
            cpf,
            self.campus,
            self.course,
        ) {
            (true, Some(enrollment), Some(name), Some(email), Some(cpf), Some(campus), Some(course)) => {
                Ok(CandidateRow {
                    campus,
                    course,
                    shift: self.shift,
                    education: self.education,
                    enrollment,
                    name,
                    cpf,
                    birth_date,
                    sex: self.sex.as_deref().and_then(Sex::from_code),
                    state: self.state,
                    municipality: self.municipality,
                    phone_primary: self.phone_primary,
                    phone_secondary: self.phone_secondary,
                    email,
                    modality: self.modality,
                })
            }
            _ => Err(errors),
        }
    }
}

/// Accepts `d/m/Y` first, then ISO dates.
pub(crate) fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
        .ok()
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "NO_CAMPUS,NO_CURSO,DS_TURNO,DS_FORMACAO,CO_INSCRICAO_ENEM,NO_INSCRITO,\
NU_CPF_INSCRITO,DT_NASCIMENTO,TP_SEXO,SG_UF_INSCRITO,NO_MUNICIPIO,NU_FONE1,NU_FONE2,DS_EMAIL,\
MODALIDADE_ESCOLHIDA";

    #[test]
    fn reports_every_missing_required_column() {
        let csv = "NO_CAMPUS,NO_INSCRITO,DS_EMAIL\nCentral,Ana,ana@example.com\n";
        match parse_sheet(csv.as_bytes()) {
            Err(SheetError::MissingColumns(missing)) => assert_eq!(
                missing,
                vec!["NO_CURSO", "CO_INSCRICAO_ENEM", "NU_CPF_INSCRITO"]
            ),
            other => panic!("expected missing columns, got {other:?}"),
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(parse_sheet("".as_bytes()), Err(SheetError::Empty)));
    }

    #[test]
    fn numbers_rows_from_two_and_validates_fields() {
        let csv = format!(
            "{HEADER}\n\
             Central, Engenharia ,Integral,Bacharelado,251,Ana Souza,529.982.247-25,31/12/2004,F,BA,Salvador,,,ana@example.com,EEP - Escola pública\n\
             Central,Engenharia,,,252,Bruno,111.111.111-11,2004-13-01,M,,,,,bruno-at-example,\n"
        );
        let sheet = parse_sheet(csv.as_bytes()).expect("sheet parses");
        assert_eq!(sheet.rows.len(), 2);

        let (line, row) = sheet.rows.into_iter().next().expect("first row");
        assert_eq!(line, 2);
        let candidate = row.expect("row deserializes").validate().expect("valid row");
        assert_eq!(candidate.course, "Engenharia");
        assert_eq!(candidate.cpf.as_str(), "52998224725");
        assert_eq!(candidate.birth_date, NaiveDate::from_ymd_opt(2004, 12, 31));
        assert_eq!(candidate.sex, Some(Sex::Female));
        assert!(candidate.phone_primary.is_none());
    }

    #[test]
    fn invalid_row_collects_all_errors() {
        let csv = format!(
            "{HEADER}\nCentral,Engenharia,,,252,,111.111.111-11,2004-13-01,M,,,,,bruno-at-example,\n"
        );
        let sheet = parse_sheet(csv.as_bytes()).expect("sheet parses");
        let (_, row) = sheet.rows.into_iter().next().expect("row");
        let errors = row.expect("deserializes").validate().expect_err("invalid");
        assert_eq!(
            errors,
            vec![
                "Campo obrigatório vazio: nome".to_string(),
                "Email inválido: bruno-at-example".to_string(),
                "CPF inválido: 111.111.111-11".to_string(),
                "Data de nascimento inválida: 2004-13-01".to_string(),
            ]
        );
    }

    #[test]
    fn short_rows_fill_missing_columns_with_none() {
        let csv = format!("{HEADER}\nCentral,Engenharia\n");
        let sheet = parse_sheet(csv.as_bytes()).expect("sheet parses");
        let (_, row) = sheet.rows.into_iter().next().expect("row");
        let errors = row.expect("deserializes").validate().expect_err("invalid");
        assert!(errors.contains(&"Campo obrigatório vazio: inscricao".to_string()));
    }

    #[test]
    fn birth_dates_accept_both_formats() {
        assert_eq!(
            parse_birth_date("01/02/2003"),
            NaiveDate::from_ymd_opt(2003, 2, 1)
        );
        assert_eq!(
            parse_birth_date("2003-02-01"),
            NaiveDate::from_ymd_opt(2003, 2, 1)
        );
        assert_eq!(parse_birth_date("2003/02/01"), None);
    }
}
