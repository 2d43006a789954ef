//! Candidate import from the SiSU spreadsheet export.

mod parser;

use std::io::Read;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::workflows::admissions::domain::{CampusId, CourseId, NewCandidate, NewCourse};
use crate::workflows::admissions::notifier::{Mailer, Notifier};
use crate::workflows::admissions::provisioning::{modality_for, required_documents};
use crate::workflows::admissions::repository::{AdmissionsRepository, RepositoryError};

use parser::{parse_sheet, CandidateRow, SheetError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Deletes every candidate and document before the rows are imported.
    pub clear_existing: bool,
    pub send_welcome: bool,
}

/// Counts and messages; rows imported before a failure stay imported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub total_rows: usize,
    pub successful_imports: usize,
    pub failed_imports: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ImportReport {
    fn row_error(&mut self, line: usize, message: impl std::fmt::Display) {
        self.errors.push(format!("Linha {line}: {message}"));
    }

    fn row_warning(&mut self, line: usize, message: impl std::fmt::Display) {
        self.warnings.push(format!("Linha {line}: {message}"));
    }
}

#[derive(Debug)]
pub enum ImportError {
    Csv(csv::Error),
    Repository(RepositoryError),
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Csv(err) => write!(f, "invalid SiSU CSV data: {}", err),
            ImportError::Repository(err) => write!(f, "could not prepare the import: {}", err),
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImportError::Csv(err) => Some(err),
            ImportError::Repository(err) => Some(err),
        }
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<RepositoryError> for ImportError {
    fn from(err: RepositoryError) -> Self {
        Self::Repository(err)
    }
}

pub struct SisuImporter<'a, R, M> {
    repository: &'a R,
    notifier: &'a Notifier<R, M>,
    now: DateTime<Utc>,
}

impl<'a, R, M> SisuImporter<'a, R, M>
where
    R: AdmissionsRepository + 'static,
    M: Mailer + 'static,
{
    pub fn new(repository: &'a R, notifier: &'a Notifier<R, M>, now: DateTime<Utc>) -> Self {
        Self {
            repository,
            notifier,
            now,
        }
    }

    /// A file without the required header is rejected before anything is cleared.
    pub async fn import<Rd: Read>(
        &self,
        reader: Rd,
        options: ImportOptions,
    ) -> Result<ImportReport, ImportError> {
        let mut report = ImportReport::default();

        let sheet = match parse_sheet(reader) {
            Ok(sheet) => sheet,
            Err(SheetError::Empty) => {
                report
                    .errors
                    .push("Arquivo CSV vazio ou formato inválido.".to_string());
                return Ok(report);
            }
            Err(SheetError::MissingColumns(missing)) => {
                report.errors.push(format!(
                    "Campos obrigatórios não encontrados no CSV: {}",
                    missing.join(", ")
                ));
                return Ok(report);
            }
            Err(SheetError::Csv(err)) => return Err(err.into()),
        };

        if options.clear_existing {
            let removed = self.repository.clear_candidates().await?;
            info!(removed, "existing candidates cleared before import");
            report
                .warnings
                .push("Dados existentes foram limpos antes da importação.".to_string());
        }

        for (line, row) in sheet.rows {
            report.total_rows += 1;

            let row = match row {
                Ok(row) => row,
                Err(message) => {
                    report.row_error(line, message);
                    report.failed_imports += 1;
                    continue;
                }
            };
            let candidate = match row.validate() {
                Ok(candidate) => candidate,
                Err(errors) => {
                    for error in errors {
                        report.row_error(line, error);
                    }
                    report.failed_imports += 1;
                    continue;
                }
            };

            self.import_row(line, candidate, options, &mut report).await;
        }

        info!(
            total = report.total_rows,
            imported = report.successful_imports,
            failed = report.failed_imports,
            warnings = report.warnings.len(),
            "SiSU import finished"
        );
        Ok(report)
    }

    async fn import_row(
        &self,
        line: usize,
        row: CandidateRow,
        options: ImportOptions,
        report: &mut ImportReport,
    ) {
        let (campus_id, course_id) = match self.placement(&row).await {
            Ok(ids) => ids,
            Err(message) => {
                report.row_error(line, message);
                report.failed_imports += 1;
                return;
            }
        };

        match self
            .repository
            .find_by_enrollment_or_cpf(&row.enrollment, &row.cpf)
            .await
        {
            Ok(Some(_)) => {
                report.row_warning(
                    line,
                    format!("Candidato já existe (Inscrição: {})", row.enrollment),
                );
                return;
            }
            Ok(None) => {}
            Err(err) => {
                report.row_error(line, format!("Erro ao consultar candidato - {err}"));
                report.failed_imports += 1;
                return;
            }
        }

        let requirements = required_documents(modality_for(row.modality.as_deref()), row.sex);
        let enrollment = row.enrollment.clone();
        let candidate = NewCandidate {
            enrollment: row.enrollment,
            name: row.name,
            email: row.email,
            cpf: row.cpf,
            birth_date: row.birth_date,
            sex: row.sex,
            phone_primary: row.phone_primary,
            phone_secondary: row.phone_secondary,
            state: row.state,
            municipality: row.municipality,
            campus_id,
            course_id,
            shift: row.shift,
            education: row.education,
            modality: row.modality,
        };

        match self
            .repository
            .create_candidate(candidate, &requirements, self.now)
            .await
        {
            Ok(created) => {
                report.successful_imports += 1;
                if options.send_welcome {
                    self.notifier.welcome(&created).await;
                }
            }
            Err(RepositoryError::Conflict) => {
                report.row_warning(line, format!("Candidato já existe (Inscrição: {enrollment})"));
            }
            Err(err) => {
                warn!(line, error = %err, "candidate insert failed");
                report.row_error(
                    line,
                    format!("Erro ao inserir candidato no banco de dados - {err}"),
                );
                report.failed_imports += 1;
            }
        }
    }

    /// Finds the campus and course by exact name, creating them when absent.
    async fn placement(&self, row: &CandidateRow) -> Result<(CampusId, CourseId), String> {
        let campus = match self.repository.find_campus_by_name(&row.campus).await {
            Ok(Some(campus)) => campus,
            Ok(None) => self
                .repository
                .insert_campus(&row.campus)
                .await
                .map_err(|_| format!("Erro ao processar campus: {}", row.campus))?,
            Err(_) => return Err(format!("Erro ao processar campus: {}", row.campus)),
        };

        let course = match self.repository.find_course(&row.course, campus.id).await {
            Ok(Some(course)) => course,
            Ok(None) => self
                .repository
                .insert_course(NewCourse {
                    name: row.course.clone(),
                    campus_id: campus.id,
                })
                .await
                .map_err(|_| format!("Erro ao processar curso: {}", row.course))?,
            Err(_) => return Err(format!("Erro ao processar curso: {}", row.course)),
        };

        Ok((campus.id, course.id))
    }
}
