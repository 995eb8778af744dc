use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

use crate::domain::{ContentMode, FilterId};

pub const SETTINGS_FILE_NAME: &str = "appsettings.json";

const DEFAULT_FROM_NAME: &str = "Jira Data Hygiene";
const DEFAULT_SUBJECT_TEMPLATE: &str = "[Jira] {IssueCount} issues for {Assignee}";
const DEFAULT_BODY_TEMPLATE: &str = "Hello {Assignee},\n\nPlease review the following {IssueCount} issues that are in inconsistent state:\n{Filters}";
const DEFAULT_SENDGRID_API: &str = "https://api.sendgrid.com/";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Settings {
    #[serde(default)]
    pub jira: JiraSettings,
    #[serde(default)]
    pub send_grid: SendGridSettings,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct JiraSettings {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
    pub filters: Vec<FilterSettings>,
    pub enable_comments: bool,
    pub log_comments: bool,
    pub comment_dup_days_skip: i64,
}

impl Default for JiraSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            email: String::new(),
            api_token: String::new(),
            filters: Vec::new(),
            enable_comments: false,
            log_comments: false,
            comment_dup_days_skip: 7,
        }
    }
}

/// A saved Jira filter to audit. The description doubles as the reminder
/// comment text.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FilterSettings {
    pub id: FilterId,
    pub description: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SendGridSettings {
    pub api_key: String,
    pub api_base_url: String,
    pub from_email: String,
    pub from_name: String,
    pub subject_template: String,
    pub body_template: String,
    pub content_type: String,
    pub dry_run: bool,
    pub dry_run_max_emails: usize,
    pub dry_run_email: String,
    pub dry_run_name: String,
    pub footer_html: String,
    pub footer_text: String,
    pub cc_emails: String,
    pub send_log_email: bool,
    pub log_email: String,
}

impl Default for SendGridSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: DEFAULT_SENDGRID_API.to_owned(),
            from_email: String::new(),
            from_name: DEFAULT_FROM_NAME.to_owned(),
            subject_template: DEFAULT_SUBJECT_TEMPLATE.to_owned(),
            body_template: DEFAULT_BODY_TEMPLATE.to_owned(),
            content_type: "text/plain".to_owned(),
            dry_run: false,
            dry_run_max_emails: 0,
            dry_run_email: String::new(),
            dry_run_name: String::new(),
            footer_html: String::new(),
            footer_text: String::new(),
            cc_emails: String::new(),
            send_log_email: false,
            log_email: String::new(),
        }
    }
}

impl SendGridSettings {
    pub fn content_mode(&self) -> ContentMode {
        ContentMode::from_content_type(&self.content_type)
    }

    /// CC addresses from the comma-separated setting, trimmed, blanks dropped.
    pub fn cc_list(&self) -> Vec<String> {
        self.cc_emails
            .split(',')
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Destination of the run log, if one should be sent.
    pub fn log_recipient(&self) -> Option<&str> {
        let recipient = self.log_email.trim();
        (self.send_log_email && !recipient.is_empty()).then_some(recipient)
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ConfigError::Missing(path.to_owned()),
            _ => ConfigError::Io(err),
        })?;
        let settings: Settings = serde_json::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jira.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("Jira.BaseUrl is required"));
        }
        if self.jira.filters.is_empty() {
            return Err(ConfigError::NoFilters);
        }
        if self.send_grid.from_email.trim().is_empty() {
            return Err(ConfigError::Invalid("SendGrid.FromEmail is required"));
        }
        if self.send_grid.dry_run && self.send_grid.dry_run_email.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "SendGrid.DryRunEmail is required when DryRun is enabled",
            ));
        }
        Ok(())
    }
}

/// Picks the settings file: an explicit path wins, then `appsettings.json`
/// next to the executable, then in the working directory.
pub fn resolve_settings_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_owned());
    }

    let beside_exe = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(SETTINGS_FILE_NAME)));
    if let Some(path) = beside_exe.filter(|path| path.is_file()) {
        return Ok(path);
    }

    let local = PathBuf::from(SETTINGS_FILE_NAME);
    if local.is_file() {
        return Ok(local);
    }

    Err(ConfigError::Missing(local))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing {0}. Create it based on appsettings.example.json.")]
    Missing(PathBuf),
    #[error("I/O error while reading settings: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid settings format: {0}")]
    Format(#[from] serde_json::Error),
    #[error("No Jira filter IDs configured.")]
    NoFilters,
    #[error("Invalid settings: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_settings(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, contents).expect("write settings");
        (dir, path)
    }

    #[test]
    fn load_applies_defaults_for_omitted_fields() {
        let (_dir, path) = write_settings(
            r#"{
                "Jira": {
                    "BaseUrl": "https://acme.atlassian.net",
                    "Filters": [{ "Id": 101, "Description": "Set a due date" }]
                },
                "SendGrid": { "FromEmail": "bot@acme.test" }
            }"#,
        );

        let settings = Settings::load(&path).expect("settings");
        assert_eq!(settings.jira.filters.len(), 1);
        assert_eq!(settings.jira.filters[0].id, 101);
        assert_eq!(settings.jira.comment_dup_days_skip, 7);
        assert!(!settings.jira.enable_comments);
        assert_eq!(settings.send_grid.from_name, DEFAULT_FROM_NAME);
        assert_eq!(settings.send_grid.subject_template, DEFAULT_SUBJECT_TEMPLATE);
        assert_eq!(settings.send_grid.content_mode(), ContentMode::PlainText);
        assert_eq!(settings.send_grid.api_base_url, DEFAULT_SENDGRID_API);
    }

    #[test]
    fn load_rejects_empty_filter_list() {
        let (_dir, path) = write_settings(
            r#"{ "Jira": { "BaseUrl": "https://acme", "Filters": [] },
                 "SendGrid": { "FromEmail": "bot@acme.test" } }"#,
        );
        assert!(matches!(Settings::load(&path), Err(ConfigError::NoFilters)));
    }

    #[test]
    fn load_reports_missing_and_malformed_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.json");
        assert!(matches!(
            Settings::load(&missing),
            Err(ConfigError::Missing(_))
        ));

        let (_dir, path) = write_settings("{ not json");
        assert!(matches!(Settings::load(&path), Err(ConfigError::Format(_))));
    }

    #[test]
    fn dry_run_requires_a_test_recipient() {
        let mut settings = Settings::default();
        settings.jira.base_url = "https://acme".into();
        settings.jira.filters.push(FilterSettings {
            id: 1,
            description: String::new(),
        });
        settings.send_grid.from_email = "bot@acme.test".into();
        settings.send_grid.dry_run = true;
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));

        settings.send_grid.dry_run_email = "qa@acme.test".into();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn cc_list_trims_and_drops_blanks() {
        let settings = SendGridSettings {
            cc_emails: " lead@acme.test, ,ops@acme.test ,".into(),
            ..SendGridSettings::default()
        };
        assert_eq!(settings.cc_list(), vec!["lead@acme.test", "ops@acme.test"]);
        assert!(SendGridSettings::default().cc_list().is_empty());
    }

    #[test]
    fn log_recipient_needs_flag_and_address() {
        let mut settings = SendGridSettings {
            log_email: "admin@acme.test".into(),
            ..SendGridSettings::default()
        };
        assert_eq!(settings.log_recipient(), None);
        settings.send_log_email = true;
        assert_eq!(settings.log_recipient(), Some("admin@acme.test"));
        settings.log_email = "  ".into();
        assert_eq!(settings.log_recipient(), None);
    }

    #[test]
    fn explicit_settings_path_wins() {
        let path = Path::new("/tmp/custom.json");
        assert_eq!(
            resolve_settings_path(Some(path)).expect("path"),
            path.to_path_buf()
        );
    }
}
