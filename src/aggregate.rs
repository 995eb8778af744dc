use std::fmt;

use tracing::debug;

use crate::domain::{AssigneeBuckets, FilterId, FilterResult, Issue, IssueEntry, issue_url};

/// Result of folding every filter's issues into per-assignee buckets.
#[derive(Debug, Default)]
pub struct Aggregation {
    pub buckets: AssigneeBuckets,
    /// Issues seen across all filters, skipped ones included.
    pub issues_seen: usize,
    pub skipped: Vec<SkippedIssue>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedIssue {
    pub key: String,
    pub filter_id: FilterId,
    pub reason: SkipReason,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NoAssignee,
    NoEmail,
}

impl fmt::Display for SkippedIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            SkipReason::NoAssignee => write!(f, "Skipping {}: no assignee.", self.key),
            SkipReason::NoEmail => {
                write!(f, "Skipping {}: assignee email not available.", self.key)
            }
        }
    }
}

/// Groups issues by assignee email, then by filter.
///
/// Filters are consumed in the given order and issues in pagination order, so
/// bucket creation order (and therefore email send order) and entry order are
/// both deterministic. Issues without an assignee email are reported in
/// `skipped` and otherwise ignored.
pub fn aggregate(results: &[FilterResult], base_url: &str) -> Aggregation {
    let mut aggregation = Aggregation::default();

    for filter in results {
        for issue in &filter.issues {
            aggregation.issues_seen += 1;

            let Some(assignee) = &issue.assignee else {
                skip(&mut aggregation, filter, issue, SkipReason::NoAssignee);
                continue;
            };
            let Some(email) = assignee.usable_email() else {
                skip(&mut aggregation, filter, issue, SkipReason::NoEmail);
                continue;
            };

            aggregation
                .buckets
                .entry(email, assignee.display_name.as_deref())
                .filter_bucket_mut(filter)
                .entries
                .push(IssueEntry {
                    key: issue.key.clone(),
                    summary: issue.summary.clone(),
                    filter_id: filter.filter_id,
                    issue_url: issue_url(base_url, &issue.key),
                });
        }
    }

    aggregation
}

fn skip(aggregation: &mut Aggregation, filter: &FilterResult, issue: &Issue, reason: SkipReason) {
    let skipped = SkippedIssue {
        key: issue.key.clone(),
        filter_id: filter.filter_id,
        reason,
    };
    debug!(issue = %skipped.key, filter = skipped.filter_id, "{skipped}");
    aggregation.skipped.push(skipped);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::Assignee;

    pub(crate) fn issue(key: &str, email: Option<&str>, name: Option<&str>) -> Issue {
        Issue {
            key: key.into(),
            summary: format!("Summary of {key}"),
            assignee: Some(Assignee {
                email: email.map(str::to_owned),
                display_name: name.map(str::to_owned),
                account_id: Some(format!("acc-{key}")),
            }),
        }
    }

    pub(crate) fn filter(id: FilterId, name: &str, issues: Vec<Issue>) -> FilterResult {
        FilterResult {
            filter_id: id,
            filter_name: name.into(),
            description: format!("Fix {name}"),
            issues,
        }
    }

    #[test]
    fn two_filters_for_one_assignee_share_a_bucket() {
        let results = vec![
            filter(
                101,
                "Stale Issues",
                vec![issue("OPS-1", Some("jane@example.com"), Some("Jane"))],
            ),
            filter(
                102,
                "No Due Date",
                vec![issue("OPS-2", Some("jane@example.com"), Some("Jane"))],
            ),
        ];

        let aggregation = aggregate(&results, "https://acme.atlassian.net");
        assert_eq!(aggregation.buckets.len(), 1);
        let jane = aggregation.buckets.get("jane@example.com").expect("jane");
        assert_eq!(jane.filters().len(), 2);
        assert_eq!(jane.issue_count(), 2);
        let stale = jane.filter(101).expect("stale bucket");
        assert_eq!(stale.filter_name, "Stale Issues");
        assert_eq!(stale.description, "Fix Stale Issues");
        assert_eq!(
            stale.entries[0].issue_url,
            "https://acme.atlassian.net/browse/OPS-1"
        );
    }

    #[test]
    fn issues_without_assignee_email_are_skipped() {
        let mut unassigned = issue("OPS-3", None, None);
        unassigned.assignee = None;
        let results = vec![filter(
            1,
            "Hygiene",
            vec![
                unassigned,
                issue("OPS-4", Some("   "), Some("Blank")),
                issue("OPS-5", None, Some("Hidden")),
                issue("OPS-6", Some("bob@example.com"), Some("Bob")),
            ],
        )];

        let aggregation = aggregate(&results, "https://acme/");
        assert_eq!(aggregation.issues_seen, 4);
        assert_eq!(aggregation.buckets.len(), 1);
        let reasons: Vec<_> = aggregation
            .skipped
            .iter()
            .map(|skipped| (skipped.key.as_str(), skipped.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("OPS-3", SkipReason::NoAssignee),
                ("OPS-4", SkipReason::NoEmail),
                ("OPS-5", SkipReason::NoEmail),
            ]
        );
        assert_eq!(
            aggregation.skipped[0].to_string(),
            "Skipping OPS-3: no assignee."
        );
    }

    #[test]
    fn email_case_merges_and_first_display_name_wins() {
        let results = vec![
            filter(1, "A", vec![issue("OPS-1", Some("A@x.com"), Some("Ann"))]),
            filter(2, "B", vec![issue("OPS-2", Some("a@X.com"), Some("Annie"))]),
        ];

        let aggregation = aggregate(&results, "https://acme/");
        assert_eq!(aggregation.buckets.len(), 1);
        let bucket = aggregation.buckets.iter().next().expect("bucket");
        assert_eq!(bucket.email, "A@x.com");
        assert_eq!(bucket.display_name.as_deref(), Some("Ann"));
        assert_eq!(bucket.issue_count(), 2);
    }

    #[test]
    fn order_follows_arrival() {
        let results = vec![
            filter(
                1,
                "Z filter",
                vec![
                    issue("OPS-9", Some("zed@example.com"), None),
                    issue("OPS-3", Some("amy@example.com"), None),
                    issue("OPS-1", Some("zed@example.com"), None),
                ],
            ),
            filter(2, "A filter", vec![issue("OPS-2", Some("amy@example.com"), None)]),
        ];

        let aggregation = aggregate(&results, "https://acme/");
        let emails: Vec<_> = aggregation
            .buckets
            .iter()
            .map(|bucket| bucket.email.as_str())
            .collect();
        assert_eq!(emails, vec!["zed@example.com", "amy@example.com"]);

        let zed = aggregation.buckets.get("zed@example.com").expect("zed");
        let keys: Vec<_> = zed.filters()[0]
            .entries
            .iter()
            .map(|entry| entry.key.as_str())
            .collect();
        assert_eq!(keys, vec!["OPS-9", "OPS-1"]);

        let amy = aggregation.buckets.get("amy@example.com").expect("amy");
        let filter_ids: Vec<_> = amy.filters().iter().map(|bucket| bucket.filter_id).collect();
        assert_eq!(filter_ids, vec![1, 2]);
    }

    #[test]
    fn every_issue_lands_in_exactly_one_place() {
        let emails = ["a@x.com", "B@x.com", "b@x.com", " ", "c@x.com"];
        let issues: Vec<_> = (0..20)
            .map(|n| issue(&format!("OPS-{n}"), Some(emails[n % emails.len()]), None))
            .collect();
        let results = vec![filter(1, "One", issues.clone()), filter(2, "Two", issues)];

        let aggregation = aggregate(&results, "https://acme/");
        let placed: usize = aggregation.buckets.iter().map(|b| b.issue_count()).sum();
        assert_eq!(placed + aggregation.skipped.len(), aggregation.issues_seen);
        assert_eq!(aggregation.issues_seen, 40);
        assert_eq!(aggregation.skipped.len(), 8);
        assert_eq!(aggregation.buckets.len(), 3);
        for bucket in aggregation.buckets.iter() {
            assert_eq!(bucket.filters().len(), 2);
        }
    }
}
