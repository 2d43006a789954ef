pub mod admissions;
pub mod sisu_import;
