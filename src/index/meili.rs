//! Meilisearch backend over the REST API
//!
//! Uses the blocking reqwest client: the sync worker is a plain thread and
//! every index call happens between two SQLite statements anyway.
//!
//! Write endpoints are asynchronous on the server side. They return a task
//! reference which, with `wait_for_tasks`, is polled until the task
//! succeeds, fails, or `task_timeout_secs` elapses.
//!
//! | Operation        | Request                                         |
//! |------------------|-------------------------------------------------|
//! | `ensure_ready`   | `GET /indexes/{uid}`, `POST /indexes` on 404    |
//! |                  | `PUT .../settings/filterable-attributes`        |
//! | `delete_where`   | `POST .../documents/delete {filter}`            |
//! | `delete_all`     | `DELETE .../documents`                          |
//! | `add_or_replace` | `POST .../documents?primaryKey=id`              |
//! | `search`         | `POST .../search {q, limit}`                    |
//! | `documents`      | `GET .../documents?limit=N`                     |

use std::time::{Duration, Instant};

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{IndexFilter, SearchIndex, FILTERABLE_ATTRIBUTES};
use crate::config::IndexConfig;
use crate::error::{IndexerError, Result};
use crate::schema::CaseDocument;

const TASK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Reference returned by every write endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRef {
    task_uid: u64,
}

#[derive(Debug, Deserialize)]
struct TaskStatus {
    status: String,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct DocumentsPage {
    #[serde(default)]
    results: Vec<Value>,
}

/// Meilisearch index client
pub struct MeiliIndex {
    client: Client,
    base_url: String,
    uid: String,
    api_key: Option<String>,
    wait_for_tasks: bool,
    task_timeout: Duration,
}

impl MeiliIndex {
    /// Build a client; no request is sent until the first call
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            uid: config.name.clone(),
            api_key: Some(config.api_key.clone()).filter(|k| !k.is_empty()),
            wait_for_tasks: config.wait_for_tasks,
            task_timeout: Duration::from_secs(config.task_timeout_secs),
        })
    }

    /// URL of a path below this index
    fn index_url(&self, path: &str) -> String {
        format!("{}/indexes/{}{}", self.base_url, self.uid, path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send()?;
        check_status(response)
    }

    /// Send a write request and, if configured, wait for its task
    fn send_task(&self, builder: RequestBuilder) -> Result<()> {
        let task: TaskRef = self.send(builder)?.json()?;
        if self.wait_for_tasks {
            self.wait_for_task(task.task_uid)?;
        }
        Ok(())
    }

    fn wait_for_task(&self, task_uid: u64) -> Result<()> {
        let url = format!("{}/tasks/{}", self.base_url, task_uid);
        let started = Instant::now();
        loop {
            let task: TaskStatus = self.send(self.request(Method::GET, &url))?.json()?;
            match task.status.as_str() {
                "succeeded" => return Ok(()),
                "failed" | "canceled" => {
                    let detail = task
                        .error
                        .as_ref()
                        .and_then(|e| e.get("message"))
                        .and_then(Value::as_str)
                        .unwrap_or("no detail");
                    return Err(IndexerError::Index {
                        message: format!("Task {} {}: {}", task_uid, task.status, detail),
                        transient: false,
                    });
                }
                _ => {}
            }
            if started.elapsed() >= self.task_timeout {
                return Err(IndexerError::Index {
                    message: format!(
                        "Task {} still {} after {:?}",
                        task_uid, task.status, self.task_timeout
                    ),
                    transient: true,
                });
            }
            std::thread::sleep(TASK_POLL_INTERVAL);
        }
    }
}

/// Map non-success responses to index errors; 429 and 5xx are transient
fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().unwrap_or_default();
    Err(IndexerError::Index {
        message: format!("{} returned {}: {}", url, status, body.trim()),
        transient: is_transient_status(status),
    })
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

impl SearchIndex for MeiliIndex {
    fn ensure_ready(&self) -> Result<()> {
        let response = self.request(Method::GET, &self.index_url("")).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::info!("[INDEX] Creating index {}", self.uid);
            let create = self
                .request(Method::POST, &format!("{}/indexes", self.base_url))
                .json(&json!({ "uid": self.uid, "primaryKey": "id" }));
            self.send_task(create)?;
        } else {
            check_status(response)?;
        }

        let settings = self
            .request(
                Method::PUT,
                &self.index_url("/settings/filterable-attributes"),
            )
            .json(&FILTERABLE_ATTRIBUTES);
        self.send_task(settings)
    }

    fn delete_where(&self, filter: &IndexFilter) -> Result<()> {
        let builder = self
            .request(Method::POST, &self.index_url("/documents/delete"))
            .json(&json!({ "filter": filter.expression() }));
        self.send_task(builder)
    }

    fn delete_all(&self) -> Result<()> {
        self.send_task(self.request(Method::DELETE, &self.index_url("/documents")))
    }

    fn add_or_replace(&self, docs: &[CaseDocument]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let builder = self
            .request(Method::POST, &self.index_url("/documents?primaryKey=id"))
            .json(docs);
        self.send_task(builder)
    }

    fn search(&self, query: &str, limit: usize) -> Result<Value> {
        let builder = self
            .request(Method::POST, &self.index_url("/search"))
            .json(&json!({ "q": query, "limit": limit }));
        Ok(self.send(builder)?.json()?)
    }

    fn documents(&self, limit: usize) -> Result<Vec<Value>> {
        let url = self.index_url(&format!("/documents?limit={}", limit));
        let page: DocumentsPage = self.send(self.request(Method::GET, &url))?.json()?;
        Ok(page.results)
    }

    fn describe(&self) -> String {
        format!("meilisearch {} index {}", self.base_url, self.uid)
    }
}
