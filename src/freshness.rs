use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::{
    adf::RichNode,
    jira::{FetchError, IssueSource},
};

/// Appended to every automated reminder so later runs can tell them apart
/// from comments written by people.
pub const COMMENT_MARKER: &str = "#datahygiene";

pub const COMMENT_PAGE_SIZE: usize = 50;

const JIRA_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommentDecision {
    /// No earlier reminder exists.
    Post,
    /// A reminder exists and is still inside the freshness window.
    Skip { last: DateTime<Utc> },
    /// A reminder exists but is old enough that a new one is due.
    PostAsDuplicate { last: DateTime<Utc>, age_days: i64 },
}

impl CommentDecision {
    pub fn should_post(&self) -> bool {
        !matches!(self, CommentDecision::Skip { .. })
    }
}

/// What happened to one reminder comment.
#[derive(Debug)]
pub enum CommentOutcome {
    Posted(CommentDecision),
    Skipped(CommentDecision),
    /// Dry run: the decision was made but nothing was written.
    WouldPost(CommentDecision),
    Failed(FetchError),
}

pub fn expected_text(message: &str) -> String {
    format!("{message} {COMMENT_MARKER}")
}

/// Body of a reminder: a mention of the assignee, then the message and marker.
pub fn reminder_body(account_id: &str, message: &str) -> RichNode {
    RichNode::Document(vec![RichNode::Paragraph(vec![
        RichNode::Mention {
            id: account_id.to_owned(),
            text: None,
        },
        RichNode::Text(format!(" {}", expected_text(message))),
    ])])
}

/// Case-insensitive containment of `expected` in the flattened body.
pub fn comment_matches(body: &RichNode, expected: &str) -> bool {
    body.plain_text()
        .to_lowercase()
        .contains(&expected.to_lowercase())
}

/// Parses Jira's `created` field. Jira writes offsets without a colon
/// (`+0000`), which RFC 3339 parsing rejects.
pub fn parse_created(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, JIRA_TIMESTAMP_FORMAT))
        .ok()
        .map(|created| created.with_timezone(&Utc))
}

/// Running maximum over matching comments. Undated matches are tracked
/// separately so they can never displace a real timestamp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LatestMatch {
    dated: Option<DateTime<Utc>>,
    undated: bool,
}

impl LatestMatch {
    pub fn observe(&mut self, created: Option<&str>) {
        match created.and_then(parse_created) {
            Some(created) => {
                if self.dated.is_none_or(|latest| created > latest) {
                    self.dated = Some(created);
                }
            }
            None => self.undated = true,
        }
    }

    /// Latest dated match, or `now` when only undated matches were seen.
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.dated.or(self.undated.then_some(now))
    }
}

/// Walks the issue's comment history for an earlier reminder carrying
/// `message`. A failed page ends the walk; whatever matched before it still
/// counts.
pub fn find_latest_match(
    source: &impl IssueSource,
    issue_key: &str,
    message: &str,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let expected = expected_text(message);
    let mut latest = LatestMatch::default();
    let mut start_at = 0;

    loop {
        let page = match source.comment_page(issue_key, start_at, COMMENT_PAGE_SIZE) {
            Ok(page) => page,
            Err(err) => {
                warn!(issue = issue_key, error = %err, "Failed to load comments");
                break;
            }
        };
        let fetched = page.items.len();

        for comment in &page.items {
            if comment_matches(&comment.body, &expected) {
                latest.observe(comment.created.as_deref());
            }
        }

        start_at += fetched;
        let total = page.total.unwrap_or(start_at);
        if fetched == 0 || start_at >= total {
            break;
        }
    }

    latest.resolve(now)
}

/// Applies the freshness window. `dup_days_skip <= 0` means any earlier
/// reminder suppresses a new one, however old.
pub fn decide(
    latest: Option<DateTime<Utc>>,
    dup_days_skip: i64,
    now: DateTime<Utc>,
) -> CommentDecision {
    let Some(last) = latest else {
        return CommentDecision::Post;
    };
    if dup_days_skip <= 0 {
        return CommentDecision::Skip { last };
    }

    let age = now - last;
    match Duration::try_days(dup_days_skip) {
        Some(window) if age >= window => CommentDecision::PostAsDuplicate {
            last,
            age_days: age.num_days(),
        },
        _ => CommentDecision::Skip { last },
    }
}

pub fn should_skip_comment(
    source: &impl IssueSource,
    issue_key: &str,
    message: &str,
    dup_days_skip: i64,
    now: DateTime<Utc>,
) -> CommentDecision {
    let latest = find_latest_match(source, issue_key, message, now);
    decide(latest, dup_days_skip, now)
}

/// Resolves freshness for one issue and posts the reminder when it is due.
pub fn ensure_reminder(
    source: &impl IssueSource,
    issue_key: &str,
    account_id: &str,
    message: &str,
    dup_days_skip: i64,
    dry_run: bool,
    now: DateTime<Utc>,
) -> CommentOutcome {
    let decision = should_skip_comment(source, issue_key, message, dup_days_skip, now);
    if !decision.should_post() {
        debug!(issue = issue_key, ?decision, "Reminder still fresh");
        return CommentOutcome::Skipped(decision);
    }
    if dry_run {
        return CommentOutcome::WouldPost(decision);
    }

    match source.post_comment(issue_key, &reminder_body(account_id, message)) {
        Ok(()) => CommentOutcome::Posted(decision),
        Err(err) => CommentOutcome::Failed(err),
    }
}
