//! Typed view over the key/value settings store.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use validator::ValidateEmail;

pub mod keys {
    pub const SYSTEM_ACTIVE: &str = "sistema_ativo";
    pub const INTAKE_START: &str = "data_inicio";
    pub const INTAKE_END: &str = "data_fim";
    pub const MAX_FILE_SIZE: &str = "max_file_size";
    pub const EMAIL_NOTIFICATIONS: &str = "email_notifications";
    pub const ADMIN_EMAIL: &str = "email_admin";
    pub const INACTIVE_MESSAGE: &str = "mensagem_sistema_inativo";
    pub const WELCOME_MESSAGE: &str = "mensagem_boas_vindas";
}

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
const STORED_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const ACCEPTED_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntakeSettings {
    pub system_active: bool,
    pub intake_start: Option<NaiveDateTime>,
    pub intake_end: Option<NaiveDateTime>,
    pub max_file_size: u64,
    pub email_notifications: bool,
    pub admin_email: Option<String>,
    pub inactive_message: String,
    pub welcome_message: String,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            system_active: false,
            intake_start: None,
            intake_end: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            email_notifications: true,
            admin_email: None,
            inactive_message: "O sistema de envio de documentos está temporariamente \
                               indisponível."
                .to_string(),
            welcome_message: "Bem-vindo ao sistema de envio de documentos do SiSU.".to_string(),
        }
    }
}

impl IntakeSettings {
    /// Missing or unparsable values fall back to defaults.
    pub fn from_store(store: &BTreeMap<String, String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| {
            store
                .get(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            system_active: text(keys::SYSTEM_ACTIVE)
                .map(|value| parse_flag(&value))
                .unwrap_or(defaults.system_active),
            intake_start: text(keys::INTAKE_START).and_then(|value| parse_datetime(&value)),
            intake_end: text(keys::INTAKE_END).and_then(|value| parse_datetime(&value)),
            max_file_size: text(keys::MAX_FILE_SIZE)
                .and_then(|value| value.parse::<u64>().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.max_file_size),
            email_notifications: text(keys::EMAIL_NOTIFICATIONS)
                .map(|value| parse_flag(&value))
                .unwrap_or(defaults.email_notifications),
            admin_email: text(keys::ADMIN_EMAIL),
            inactive_message: text(keys::INACTIVE_MESSAGE).unwrap_or(defaults.inactive_message),
            welcome_message: text(keys::WELCOME_MESSAGE).unwrap_or(defaults.welcome_message),
        }
    }

    pub fn to_store(&self) -> BTreeMap<String, String> {
        let mut store = BTreeMap::new();
        store.insert(keys::SYSTEM_ACTIVE.to_string(), flag(self.system_active));
        store.insert(
            keys::INTAKE_START.to_string(),
            self.intake_start.map(format_datetime).unwrap_or_default(),
        );
        store.insert(
            keys::INTAKE_END.to_string(),
            self.intake_end.map(format_datetime).unwrap_or_default(),
        );
        store.insert(
            keys::MAX_FILE_SIZE.to_string(),
            self.max_file_size.to_string(),
        );
        store.insert(
            keys::EMAIL_NOTIFICATIONS.to_string(),
            flag(self.email_notifications),
        );
        store.insert(
            keys::ADMIN_EMAIL.to_string(),
            self.admin_email.clone().unwrap_or_default(),
        );
        store.insert(
            keys::INACTIVE_MESSAGE.to_string(),
            self.inactive_message.clone(),
        );
        store.insert(
            keys::WELCOME_MESSAGE.to_string(),
            self.welcome_message.clone(),
        );
        store
    }

    pub fn window(&self) -> IntakeWindow {
        IntakeWindow {
            active: self.system_active,
            start: self.intake_start,
            end: self.intake_end,
        }
    }

    pub fn apply(&self, update: SettingsUpdate) -> Result<Self, SettingsError> {
        let mut next = self.clone();

        if let Some(active) = update.system_active {
            next.system_active = active;
        }
        if let Some(raw) = update.intake_start {
            next.intake_start = parse_optional_bound(&raw, keys::INTAKE_START)?;
        }
        if let Some(raw) = update.intake_end {
            next.intake_end = parse_optional_bound(&raw, keys::INTAKE_END)?;
        }
        if let (Some(start), Some(end)) = (next.intake_start, next.intake_end) {
            if start > end {
                return Err(SettingsError::InvertedWindow);
            }
        }
        if let Some(size) = update.max_file_size {
            if size == 0 {
                return Err(SettingsError::InvalidFileSize);
            }
            next.max_file_size = size;
        }
        if let Some(enabled) = update.email_notifications {
            next.email_notifications = enabled;
        }
        if let Some(raw) = update.admin_email {
            let trimmed = raw.trim();
            next.admin_email = if trimmed.is_empty() {
                None
            } else if trimmed.validate_email() {
                Some(trimmed.to_string())
            } else {
                return Err(SettingsError::InvalidEmail(trimmed.to_string()));
            };
        }
        if let Some(message) = update.inactive_message {
            next.inactive_message = message.trim().to_string();
        }
        if let Some(message) = update.welcome_message {
            next.welcome_message = message.trim().to_string();
        }

        Ok(next)
    }
}

/// Partial settings change; an empty string clears an intake bound.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub system_active: Option<bool>,
    pub intake_start: Option<String>,
    pub intake_end: Option<String>,
    pub max_file_size: Option<u64>,
    pub email_notifications: Option<bool>,
    pub admin_email: Option<String>,
    pub inactive_message: Option<String>,
    pub welcome_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("{key} must be a date and time like 2025-01-31T23:59")]
    InvalidDateTime { key: &'static str },
    #[error("intake start must not be after intake end")]
    InvertedWindow,
    #[error("max_file_size must be greater than zero")]
    InvalidFileSize,
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
}

/// Gate deciding whether candidates may submit or withdraw documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntakeWindow {
    pub active: bool,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    Open,
    Disabled,
    NotStarted,
    Closed,
}

impl IntakeWindow {
    /// The date range only applies when both bounds are set.
    pub fn state_at(&self, now: NaiveDateTime) -> WindowState {
        if !self.active {
            return WindowState::Disabled;
        }
        match (self.start, self.end) {
            (Some(start), Some(_)) if now < start => WindowState::NotStarted,
            (Some(_), Some(end)) if now > end => WindowState::Closed,
            _ => WindowState::Open,
        }
    }

    pub fn is_open_at(&self, now: NaiveDateTime) -> bool {
        self.state_at(now) == WindowState::Open
    }
}

pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    ACCEPTED_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
}

pub fn format_datetime(value: NaiveDateTime) -> String {
    value.format(STORED_DATETIME_FORMAT).to_string()
}

fn parse_optional_bound(
    raw: &str,
    key: &'static str,
) -> Result<Option<NaiveDateTime>, SettingsError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    parse_datetime(raw)
        .map(Some)
        .ok_or(SettingsError::InvalidDateTime { key })
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "sim"
    )
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}
