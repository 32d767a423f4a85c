use serde::{Deserialize, Serialize};

use crate::domain::UserId;

/// Body of `POST /todos`. The store assigns the id and echoes the
/// created todo back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTodoRequest {
    pub user_id: UserId,
    pub title: String,
    pub completed: bool,
}

/// Body of `PATCH /todos/{id}`. Full-field update; the store responds
/// with its canonical (possibly normalized) version of the todo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTodoRequest {
    pub title: String,
    pub completed: bool,
}
