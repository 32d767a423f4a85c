use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Response};
use shared::{
    domain::{Todo, TodoId, UserId},
    error::{ApiError, ApiException, ErrorCode},
    protocol::{CreateTodoRequest, UpdateTodoRequest},
};

use crate::TodoStore;

/// REST-backed todo store: `GET/POST /todos`, `PATCH/DELETE
/// /todos/{id}`. Listing and creation are scoped to the owning user.
pub struct HttpTodoStore {
    http: Client,
    base_url: String,
    owner: UserId,
}

impl HttpTodoStore {
    pub fn new(base_url: impl Into<String>, owner: UserId) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            owner,
        }
    }

    /// Failed requests carry a JSON `ApiError` body when the store
    /// produced the failure itself; transport-level failures fall back
    /// to a status-derived code.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if let Ok(body) = response.json::<ApiError>().await {
            return Err(ApiException::from(body).into());
        }
        Err(ApiException::new(
            ErrorCode::from_status(status.as_u16()),
            format!("todo store request failed with status {status}"),
        )
        .into())
    }
}

#[async_trait]
impl TodoStore for HttpTodoStore {
    async fn list(&self) -> Result<Vec<Todo>> {
        let response = self
            .http
            .get(format!("{}/todos", self.base_url))
            .query(&[("user_id", self.owner.0)])
            .send()
            .await?;
        let todos = Self::check(response).await?.json().await?;
        Ok(todos)
    }

    async fn create(&self, title: &str) -> Result<Todo> {
        let response = self
            .http
            .post(format!("{}/todos", self.base_url))
            .json(&CreateTodoRequest {
                user_id: self.owner,
                title: title.to_string(),
                completed: false,
            })
            .send()
            .await?;
        let todo = Self::check(response).await?.json().await?;
        Ok(todo)
    }

    async fn update(&self, todo: &Todo) -> Result<Todo> {
        let response = self
            .http
            .patch(format!("{}/todos/{}", self.base_url, todo.id.0))
            .json(&UpdateTodoRequest {
                title: todo.title.clone(),
                completed: todo.completed,
            })
            .send()
            .await?;
        let confirmed = Self::check(response).await?.json().await?;
        Ok(confirmed)
    }

    async fn delete(&self, id: TodoId) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}/todos/{}", self.base_url, id.0))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/http_store_tests.rs"]
mod tests;
