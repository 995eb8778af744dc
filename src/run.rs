use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use tracing::{error, info, info_span};

use crate::{
    aggregate::aggregate,
    config::{FilterSettings, Settings},
    domain::{AssigneeBuckets, FilterId, FilterResult, Issue, PageCursor},
    freshness::{self, CommentDecision, CommentOutcome},
    jira::IssueSource,
    sendgrid::{MailSink, OutgoingEmail},
    template::TemplateRenderer,
};

pub const ISSUE_PAGE_SIZE: usize = 50;

const RUN_LOG_SUBJECT: &str = "Jira Data Hygiene - Run Log";
const RUN_INTRO: &str = "Loading Jira issues from multiple data hygiene filters, aggregating them per assignee, and emailing each person what they need to fix.";

/// Lines worth keeping for the run-log email. Every line is also emitted as a
/// tracing event.
#[derive(Debug, Default)]
pub struct RunLog {
    entries: Vec<String>,
}

impl RunLog {
    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.entries.push(message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{message}");
        self.entries.push(message);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub filters_loaded: usize,
    pub issues_identified: usize,
    pub emails_sent: usize,
    pub email_failures: usize,
    pub recipients: usize,
    pub comments_created: usize,
    pub comment_failures: usize,
}

#[derive(Debug)]
pub struct RunReport {
    pub stats: RunStats,
    pub summary: String,
    pub log: RunLog,
}

/// Drives one run: load filters, aggregate, comment, email, summarize.
///
/// Only configuration problems stop a run, and those are caught before this
/// point. Everything here degrades to log lines and smaller counts.
pub struct Orchestrator<'a, S, M> {
    settings: &'a Settings,
    source: &'a S,
    sink: &'a M,
    log: RunLog,
}

impl<'a, S: IssueSource, M: MailSink> Orchestrator<'a, S, M> {
    pub fn new(settings: &'a Settings, source: &'a S, sink: &'a M) -> Self {
        Self {
            settings,
            source,
            sink,
            log: RunLog::default(),
        }
    }

    pub fn run(mut self) -> RunReport {
        let started = Instant::now();
        let mut stats = RunStats::default();
        self.log.info(RUN_INTRO);

        let results = {
            let _stage = info_span!("load_filters").entered();
            self.load_filters()
        };
        stats.filters_loaded = self.settings.jira.filters.len();

        let aggregation = {
            let _stage = info_span!("aggregate").entered();
            aggregate(&results, &self.settings.jira.base_url)
        };
        for skipped in &aggregation.skipped {
            self.log.info(skipped.to_string());
        }
        stats.issues_identified = aggregation.issues_seen;

        if self.settings.jira.enable_comments {
            let _stage = info_span!("post_comments").entered();
            let (created, failed) = self.post_comments(&results, Utc::now());
            stats.comments_created = created;
            stats.comment_failures = failed;
        }

        {
            let _stage = info_span!("send_emails").entered();
            self.send_digests(&aggregation.buckets, &mut stats);
        }

        let summary = render_summary(started.elapsed(), &stats);
        self.log.info(summary.clone());
        self.send_run_log();

        RunReport {
            stats,
            summary,
            log: self.log,
        }
    }

    fn load_filters(&mut self) -> Vec<FilterResult> {
        let settings = self.settings;
        let mut results = Vec::with_capacity(settings.jira.filters.len());
        for FilterSettings { id, description } in &settings.jira.filters {
            let filter_name = match self.source.filter_name(*id) {
                Ok(name) => name,
                Err(err) => {
                    self.log
                        .error(format!("Failed to load filter name {id}: {err}"));
                    format!("Filter {id}")
                }
            };
            self.log
                .info(format!("Loading issues for filter {filter_name} ({id}) ..."));
            let issues = self.load_filter_issues(*id);
            results.push(FilterResult {
                filter_id: *id,
                filter_name,
                description: description.clone(),
                issues,
            });
        }
        results
    }

    /// Pages through a filter. A failed page keeps what came before it.
    ///
    /// Paging ends on an empty page, on `isLast`, once `total` is reached, or
    /// when the server reports neither `total` nor a next-page token. A page
    /// that brings no unseen issue keys also ends it.
    fn load_filter_issues(&mut self, filter_id: FilterId) -> Vec<Issue> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = PageCursor::default();

        loop {
            let page = match self
                .source
                .search_page(filter_id, &cursor, ISSUE_PAGE_SIZE)
            {
                Ok(page) => page,
                Err(err) => {
                    self.log
                        .error(format!("Failed to load filter {filter_id}: {err}"));
                    break;
                }
            };
            let fetched = page.items.len();
            if fetched == 0 {
                break;
            }

            let before = issues.len();
            for issue in page.items {
                if seen.insert(issue.key.clone()) {
                    issues.push(issue);
                }
            }
            if issues.len() == before {
                self.log.error(format!(
                    "Stopped loading filter {filter_id}: page at {} repeated earlier issues.",
                    cursor.start_at
                ));
                break;
            }

            cursor.start_at += fetched;
            cursor.token = page.next_page_token;
            let done = match (page.is_last, page.total) {
                (Some(is_last), _) => is_last,
                (None, Some(total)) => cursor.start_at >= total,
                (None, None) => cursor.token.is_none(),
            };
            if done {
                break;
            }
        }

        issues
    }

    /// Posts reminder comments for every assigned issue whose filter has a
    /// description. Returns (created, failed).
    fn post_comments(&mut self, results: &[FilterResult], now: DateTime<Utc>) -> (usize, usize) {
        let settings = self.settings;
        let jira = &settings.jira;
        let dry_run = settings.send_grid.dry_run;
        let mut created = 0;
        let mut failed = 0;

        for filter in results {
            let message = filter.description.as_str();
            if message.trim().is_empty() {
                continue;
            }

            for issue in &filter.issues {
                let Some(assignee) = &issue.assignee else {
                    continue;
                };
                if assignee.usable_email().is_none() {
                    continue;
                }
                let Some(account_id) = assignee.usable_account_id() else {
                    self.log.info(format!(
                        "Skipping comment for {}: assignee accountId not available.",
                        issue.key
                    ));
                    continue;
                };

                if jira.log_comments {
                    self.log.info(if dry_run {
                        format!("[DryRun] Would comment on {}: {message}", issue.key)
                    } else {
                        format!("Commenting on {}: {message}", issue.key)
                    });
                }

                let outcome = freshness::ensure_reminder(
                    self.source,
                    &issue.key,
                    account_id,
                    message,
                    jira.comment_dup_days_skip,
                    dry_run,
                    now,
                );
                match outcome {
                    CommentOutcome::Posted(decision) => {
                        if let CommentDecision::PostAsDuplicate { last, age_days } = decision {
                            self.log.info(format!(
                                "\tComment already exists on {} from {}; creating duplicate because last comment is {age_days} days old.",
                                issue.key,
                                last.format("%Y-%m-%d")
                            ));
                        }
                        created += 1;
                    }
                    CommentOutcome::Skipped(CommentDecision::Skip { last }) => {
                        self.log.info(format!(
                            "\tComment already exists on {} from {}; skipping.",
                            issue.key,
                            last.format("%Y-%m-%d")
                        ));
                    }
                    CommentOutcome::Skipped(_) => {}
                    CommentOutcome::WouldPost(decision) => {
                        self.log.info(match decision {
                            CommentDecision::PostAsDuplicate { last, age_days } => format!(
                                "\t[DryRun] Comment already exists on {} from {}; would create duplicate because last comment is {age_days} days old.",
                                issue.key,
                                last.format("%Y-%m-%d")
                            ),
                            _ => format!(
                                "\t[DryRun] No comment exists on {}; would create one.",
                                issue.key
                            ),
                        });
                    }
                    CommentOutcome::Failed(err) => {
                        self.log
                            .error(format!("Failed to comment on {}: {err}", issue.key));
                        failed += 1;
                    }
                }
            }
        }

        (created, failed)
    }

    fn send_digests(&mut self, buckets: &AssigneeBuckets, stats: &mut RunStats) {
        let mail = &self.settings.send_grid;
        let renderer = TemplateRenderer::new(
            self.settings.jira.base_url.clone(),
            mail.content_mode(),
            mail.footer_html.clone(),
            mail.footer_text.clone(),
        );
        let cc = mail.cc_list();
        let prefix = if mail.dry_run { "[DryRun] " } else { "" };
        let mut attempts = 0;
        let mut recipients = HashSet::new();

        for bucket in buckets.iter() {
            if mail.dry_run && mail.dry_run_max_emails > 0 && attempts >= mail.dry_run_max_emails {
                self.log.info(format!(
                    "[DryRun] Reached DryRunMaxEmails ({}). Skipping remaining emails.",
                    mail.dry_run_max_emails
                ));
                break;
            }

            let issue_count = bucket.issue_count();
            let (to_email, to_name) = if mail.dry_run {
                (mail.dry_run_email.trim().to_owned(), mail.dry_run_name.clone())
            } else {
                (bucket.email.clone(), bucket.recipient_name().to_owned())
            };
            let email = OutgoingEmail {
                subject: renderer.render(&mail.subject_template, bucket, issue_count, false, false),
                body: renderer.render(&mail.body_template, bucket, issue_count, true, true),
                to_email,
                to_name,
                content_type: mail.content_type.clone(),
                cc: cc.clone(),
            };

            attempts += 1;
            match self.sink.send(&email) {
                Ok(()) => {
                    stats.emails_sent += 1;
                    recipients.insert(email.to_email.to_lowercase());
                    self.log.info(format!(
                        "{prefix}Sent email to {} for {issue_count} issues.",
                        email.to_email
                    ));
                }
                Err(err) => {
                    stats.email_failures += 1;
                    self.log.error(format!(
                        "{prefix}Failed to send email to {} for {issue_count} issues: {err}",
                        email.to_email
                    ));
                }
            }
        }

        stats.recipients = recipients.len();
    }

    fn send_run_log(&mut self) {
        let Some(recipient) = self.settings.send_grid.log_recipient() else {
            return;
        };
        if self.log.entries().is_empty() {
            return;
        }

        let email = OutgoingEmail {
            to_email: recipient.to_owned(),
            to_name: recipient.to_owned(),
            subject: RUN_LOG_SUBJECT.to_owned(),
            body: self.log.entries().join("\n"),
            content_type: "text/plain".to_owned(),
            cc: Vec::new(),
        };
        match self.sink.send(&email) {
            Ok(()) => self.log.info(format!("Sent run log to {recipient}.")),
            Err(err) => self
                .log
                .error(format!("Failed to send run log to {recipient}: {err}")),
        }
    }
}

pub fn render_summary(elapsed: Duration, stats: &RunStats) -> String {
    format!(
        "Run summary: Duration={}, FiltersLoaded={}, IssuesIdentified={}, EmailsSent={} to {} recipients, CommentsCreated={}.",
        format_elapsed(elapsed),
        stats.filters_loaded,
        stats.issues_identified,
        stats.emails_sent,
        stats.recipients,
        stats.comments_created
    )
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        elapsed.subsec_millis()
    )
}
