//! Jira data hygiene reminders: aggregate filter results per assignee, email
//! each assignee a digest, and optionally leave idempotent reminder comments.

pub mod adf;
pub mod aggregate;
pub mod config;
pub mod domain;
pub mod freshness;
pub mod jira;
pub mod run;
pub mod sendgrid;
pub mod template;
