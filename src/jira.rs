use reqwest::{
    StatusCode,
    blocking::{Client, Response},
    header::ACCEPT,
};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::{
    adf::RichNode,
    config::JiraSettings,
    domain::{Assignee, CommentRecord, FilterId, Issue, Page, PageCursor, ensure_trailing_slash},
};

const USER_AGENT_HEADER: &str = "datahygiene/0.1";
const SEARCH_FIELDS: &str = "summary,assignee";

/// Read and write access to the issue tracker, one request per call.
///
/// Pagination is driven by the caller so that a failed page can truncate a
/// listing instead of discarding it.
pub trait IssueSource {
    fn filter_name(&self, filter_id: FilterId) -> Result<String, FetchError>;

    fn search_page(
        &self,
        filter_id: FilterId,
        cursor: &PageCursor,
        max_results: usize,
    ) -> Result<Page<Issue>, FetchError>;

    fn comment_page(
        &self,
        issue_key: &str,
        start_at: usize,
        max_results: usize,
    ) -> Result<Page<CommentRecord>, FetchError>;

    fn post_comment(&self, issue_key: &str, body: &RichNode) -> Result<(), FetchError>;
}

pub struct JiraClient {
    client: Client,
    base_url: String,
    email: String,
    api_token: String,
}

impl JiraClient {
    pub fn new(settings: &JiraSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT_HEADER)
            .build()
            .map_err(FetchError::Http)?;
        Ok(Self {
            client,
            base_url: ensure_trailing_slash(settings.base_url.trim()),
            email: settings.email.clone(),
            api_token: settings.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn get(&self, path: &str) -> reqwest::blocking::RequestBuilder {
        self.client
            .get(self.url(path))
            .header(ACCEPT, "application/json")
            .basic_auth(&self.email, Some(&self.api_token))
    }
}

impl IssueSource for JiraClient {
    fn filter_name(&self, filter_id: FilterId) -> Result<String, FetchError> {
        let response: FilterResponse =
            checked(self.get(&format!("rest/api/3/filter/{filter_id}")).send()?)?.json()?;
        let name = response.name.trim();
        if name.is_empty() {
            return Err(FetchError::MissingField("name"));
        }
        Ok(name.to_owned())
    }

    fn search_page(
        &self,
        filter_id: FilterId,
        cursor: &PageCursor,
        max_results: usize,
    ) -> Result<Page<Issue>, FetchError> {
        let mut query = vec![
            ("jql", format!("filter={filter_id}")),
            ("startAt", cursor.start_at.to_string()),
            ("maxResults", max_results.to_string()),
            ("fields", SEARCH_FIELDS.to_owned()),
        ];
        if let Some(token) = &cursor.token {
            query.push(("nextPageToken", token.clone()));
        }
        let response: SearchResponse =
            checked(self.get("rest/api/3/search/jql").query(&query).send()?)?.json()?;

        Ok(Page {
            items: response.issues.into_iter().map(Issue::from).collect(),
            total: response.total,
            next_page_token: response.next_page_token,
            is_last: response.is_last,
        })
    }

    fn comment_page(
        &self,
        issue_key: &str,
        start_at: usize,
        max_results: usize,
    ) -> Result<Page<CommentRecord>, FetchError> {
        let response: CommentsResponse = checked(
            self.get(&format!("rest/api/3/issue/{issue_key}/comment"))
                .query(&[
                    ("startAt", start_at.to_string()),
                    ("maxResults", max_results.to_string()),
                ])
                .send()?,
        )?
        .json()?;

        Ok(Page::new(
            response
                .comments
                .into_iter()
                .map(|comment| CommentRecord {
                    body: comment
                        .body
                        .as_ref()
                        .map(RichNode::from_body)
                        .unwrap_or(RichNode::Document(Vec::new())),
                    created: comment.created,
                })
                .collect(),
            response.total,
        ))
    }

    fn post_comment(&self, issue_key: &str, body: &RichNode) -> Result<(), FetchError> {
        let payload = json!({ "body": body.to_value() });
        let response = self
            .client
            .post(self.url(&format!("rest/api/3/issue/{issue_key}/comment")))
            .header(ACCEPT, "application/json")
            .basic_auth(&self.email, Some(&self.api_token))
            .json(&payload)
            .send()?;
        checked(response)?;
        Ok(())
    }
}

/// Turns a non-success response into `FetchError::Status`, keeping the body
/// for the log.
fn checked(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(FetchError::Status { status, body })
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Jira API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Jira API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Jira response is missing `{0}`")]
    MissingField(&'static str),
}

// Response payloads ---------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FilterResponse {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<IssuePayload>,
    total: Option<usize>,
    next_page_token: Option<String>,
    is_last: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct IssuePayload {
    key: String,
    #[serde(default)]
    fields: IssueFields,
}

#[derive(Debug, Default, Deserialize)]
struct IssueFields {
    #[serde(default)]
    summary: String,
    assignee: Option<UserPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPayload {
    display_name: Option<String>,
    email_address: Option<String>,
    account_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentsResponse {
    #[serde(default)]
    comments: Vec<CommentPayload>,
    total: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct CommentPayload {
    body: Option<Value>,
    created: Option<String>,
}

impl From<IssuePayload> for Issue {
    fn from(payload: IssuePayload) -> Self {
        Issue {
            key: payload.key,
            summary: payload.fields.summary,
            assignee: payload.fields.assignee.map(|user| Assignee {
                email: user.email_address,
                display_name: user.display_name,
                account_id: user.account_id,
            }),
        }
    }
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
