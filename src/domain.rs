use std::collections::HashMap;

use crate::adf::RichNode;

// Domain data structures shared across modules.

pub type FilterId = u64;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Assignee {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub account_id: Option<String>,
}

impl Assignee {
    /// Trimmed email, or `None` when missing or blank.
    pub fn usable_email(&self) -> Option<&str> {
        non_blank(self.email.as_deref())
    }

    pub fn usable_account_id(&self) -> Option<&str> {
        non_blank(self.account_id.as_deref())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Issue {
    pub key: String,
    pub summary: String,
    pub assignee: Option<Assignee>,
}

/// Issues returned by one configured filter, in pagination order.
#[derive(Clone, Debug)]
pub struct FilterResult {
    pub filter_id: FilterId,
    pub filter_name: String,
    pub description: String,
    pub issues: Vec<Issue>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssueEntry {
    pub key: String,
    pub summary: String,
    pub filter_id: FilterId,
    pub issue_url: String,
}

#[derive(Clone, Debug)]
pub struct FilterBucket {
    pub filter_id: FilterId,
    pub filter_name: String,
    pub description: String,
    pub entries: Vec<IssueEntry>,
}

/// Everything one recipient gets told about in a single run.
#[derive(Clone, Debug)]
pub struct AssigneeBucket {
    pub email: String,
    pub display_name: Option<String>,
    filters: Vec<FilterBucket>,
}

impl AssigneeBucket {
    pub fn new(email: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            email: email.into(),
            display_name,
            filters: Vec::new(),
        }
    }

    /// Name used for `{Assignee}` and the recipient display name.
    pub fn recipient_name(&self) -> &str {
        non_blank(self.display_name.as_deref()).unwrap_or(&self.email)
    }

    /// Filter buckets in the order they were first populated.
    pub fn filters(&self) -> &[FilterBucket] {
        &self.filters
    }

    pub fn filter(&self, filter_id: FilterId) -> Option<&FilterBucket> {
        self.filters.iter().find(|bucket| bucket.filter_id == filter_id)
    }

    pub fn issue_count(&self) -> usize {
        self.filters.iter().map(|bucket| bucket.entries.len()).sum()
    }

    pub fn filter_bucket_mut(&mut self, filter: &FilterResult) -> &mut FilterBucket {
        let position = match self
            .filters
            .iter()
            .position(|bucket| bucket.filter_id == filter.filter_id)
        {
            Some(position) => position,
            None => {
                self.filters.push(FilterBucket {
                    filter_id: filter.filter_id,
                    filter_name: filter.filter_name.clone(),
                    description: filter.description.clone(),
                    entries: Vec::new(),
                });
                self.filters.len() - 1
            }
        };
        &mut self.filters[position]
    }
}

/// Assignee buckets keyed by case-insensitive email, iterated in the order
/// each email was first seen.
#[derive(Clone, Debug, Default)]
pub struct AssigneeBuckets {
    buckets: Vec<AssigneeBucket>,
    index: HashMap<String, usize>,
}

impl AssigneeBuckets {
    /// Returns the bucket for `email`, creating it with `display_name` on first
    /// sight. Later display names are ignored.
    pub fn entry(&mut self, email: &str, display_name: Option<&str>) -> &mut AssigneeBucket {
        let key = email_key(email);
        let position = match self.index.get(&key) {
            Some(&position) => position,
            None => {
                self.buckets.push(AssigneeBucket::new(
                    email,
                    display_name.map(str::to_owned),
                ));
                let position = self.buckets.len() - 1;
                self.index.insert(key, position);
                position
            }
        };
        &mut self.buckets[position]
    }

    pub fn get(&self, email: &str) -> Option<&AssigneeBucket> {
        self.index
            .get(&email_key(email))
            .map(|&position| &self.buckets[position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssigneeBucket> {
        self.buckets.iter()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Body format of outgoing email.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentMode {
    PlainText,
    Html,
}

impl ContentMode {
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.trim().eq_ignore_ascii_case("text/html") {
            ContentMode::Html
        } else {
            ContentMode::PlainText
        }
    }

    /// Blank-line sequence placed between template sections.
    pub fn separator(&self) -> &'static str {
        match self {
            ContentMode::Html => "<br/><br/>",
            ContentMode::PlainText => "\n\n",
        }
    }
}

/// One page of a paginated listing. `total`, `next_page_token` and `is_last`
/// are whatever the server reported; offset-paged listings only fill `total`.
#[derive(Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: Option<usize>,
    pub next_page_token: Option<String>,
    pub is_last: Option<bool>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: Option<usize>) -> Self {
        Self {
            items,
            total,
            next_page_token: None,
            is_last: None,
        }
    }
}

/// Position of the next search page. Offset-paged servers read `start_at`,
/// token-paged servers read `token`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageCursor {
    pub start_at: usize,
    pub token: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CommentRecord {
    pub body: RichNode,
    pub created: Option<String>,
}

pub fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_owned()
    } else {
        format!("{url}/")
    }
}

pub fn issue_url(base_url: &str, key: &str) -> String {
    format!("{}browse/{key}", ensure_trailing_slash(base_url))
}

pub fn filter_url(base_url: &str, filter_id: FilterId) -> String {
    format!("{}issues/?filter={filter_id}", ensure_trailing_slash(base_url))
}

pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}
