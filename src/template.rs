use std::fmt::Write as _;

use crate::domain::{AssigneeBucket, ContentMode, FilterBucket, filter_url};

const ASSIGNEE_TOKEN: &str = "{Assignee}";
const ISSUE_COUNT_TOKEN: &str = "{IssueCount}";
const FILTERS_TOKEN: &str = "{Filters}";

/// Renders subject and body templates for one assignee.
///
/// Tokens are matched case-insensitively. `{Filters}` expands to a block
/// listing each filter bucket (sorted by name) with its issues; when the token
/// is absent the block can be appended instead.
pub struct TemplateRenderer {
    base_url: String,
    mode: ContentMode,
    footer_html: String,
    footer_text: String,
}

impl TemplateRenderer {
    pub fn new(
        base_url: impl Into<String>,
        mode: ContentMode,
        footer_html: impl Into<String>,
        footer_text: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            mode,
            footer_html: footer_html.into(),
            footer_text: footer_text.into(),
        }
    }

    pub fn render(
        &self,
        template: &str,
        bucket: &AssigneeBucket,
        issue_count: usize,
        append_filters_when_missing: bool,
        include_footer: bool,
    ) -> String {
        let resolved = replace_token(template, ASSIGNEE_TOKEN, bucket.recipient_name());
        let mut resolved = replace_token(&resolved, ISSUE_COUNT_TOKEN, &issue_count.to_string());

        let has_filters_token = find_token(&resolved, FILTERS_TOKEN).is_some();
        if has_filters_token {
            resolved = replace_token(&resolved, FILTERS_TOKEN, &self.filters_block(bucket));
        } else if append_filters_when_missing {
            resolved.push_str(self.mode.separator());
            resolved.push_str(&self.filters_block(bucket));
        }

        if include_footer {
            resolved.push_str(self.mode.separator());
            resolved.push_str(self.footer());
        }
        resolved
    }

    fn footer(&self) -> &str {
        match self.mode {
            ContentMode::Html => &self.footer_html,
            ContentMode::PlainText => &self.footer_text,
        }
    }

    pub fn filters_block(&self, bucket: &AssigneeBucket) -> String {
        let mut filters: Vec<&FilterBucket> = bucket.filters().iter().collect();
        filters.sort_by_cached_key(|filter| filter.filter_name.to_lowercase());

        let mut block = String::new();
        for filter in filters {
            match self.mode {
                ContentMode::Html => self.write_html_filter(&mut block, filter),
                ContentMode::PlainText => self.write_text_filter(&mut block, filter),
            }
        }
        block.trim_end().to_owned()
    }

    fn write_html_filter(&self, out: &mut String, filter: &FilterBucket) {
        let url = filter_url(&self.base_url, filter.filter_id);
        let _ = writeln!(
            out,
            "<a href=\"{url}\">{} ({})</a><br/>",
            escape_html(&filter.filter_name),
            filter.entries.len()
        );
        if !filter.description.trim().is_empty() {
            let _ = writeln!(
                out,
                "<div><em>{}</em></div><br/>",
                escape_html(&filter.description)
            );
        }
        out.push_str("<ul>\n");
        for entry in &filter.entries {
            let _ = writeln!(
                out,
                "<li><a href=\"{}\">{}</a>: {}</li>",
                entry.issue_url,
                escape_html(&entry.key),
                escape_html(&entry.summary)
            );
        }
        out.push_str("</ul>\n<br/>\n");
    }

    fn write_text_filter(&self, out: &mut String, filter: &FilterBucket) {
        let url = filter_url(&self.base_url, filter.filter_id);
        let _ = writeln!(
            out,
            "Filter: {} ({} issues) {url}",
            filter.filter_name,
            filter.entries.len()
        );
        if !filter.description.trim().is_empty() {
            let _ = writeln!(out, "Description: {}", filter.description);
        }
        for entry in &filter.entries {
            let _ = writeln!(out, "- {}: {} {}", entry.key, entry.summary, entry.issue_url);
        }
        out.push('\n');
    }
}

/// Byte offset of the first case-insensitive occurrence of an ASCII token.
fn find_token(haystack: &str, token: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(token.len())
        .position(|window| window.eq_ignore_ascii_case(token.as_bytes()))
}

/// Replaces every case-insensitive occurrence of `token`. Replacement text is
/// not rescanned.
fn replace_token(haystack: &str, token: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(start) = find_token(rest, token) {
        out.push_str(&rest[..start]);
        out.push_str(replacement);
        rest = &rest[start + token.len()..];
    }
    out.push_str(rest);
    out
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
