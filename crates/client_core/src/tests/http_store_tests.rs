use std::sync::Arc;

use super::*;
use crate::{TodoController, TodoStore};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone)]
struct StoreState {
    todos: Arc<Mutex<Vec<Todo>>>,
    next_id: Arc<Mutex<i64>>,
    fail_updates: bool,
}

#[derive(Deserialize)]
struct ListQuery {
    user_id: i64,
}

async fn list_todos(
    State(state): State<StoreState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<Todo>> {
    let todos = state.todos.lock().await;
    Json(
        todos
            .iter()
            .filter(|todo| todo.user_id.0 == query.user_id)
            .cloned()
            .collect(),
    )
}

async fn create_todo(
    State(state): State<StoreState>,
    Json(body): Json<shared::protocol::CreateTodoRequest>,
) -> Json<Todo> {
    let mut next_id = state.next_id.lock().await;
    let todo = Todo {
        id: TodoId(*next_id),
        user_id: body.user_id,
        title: body.title.trim().to_string(),
        completed: body.completed,
    };
    *next_id += 1;
    state.todos.lock().await.push(todo.clone());
    Json(todo)
}

async fn update_todo(
    State(state): State<StoreState>,
    Path(id): Path<i64>,
    Json(body): Json<shared::protocol::UpdateTodoRequest>,
) -> std::result::Result<Json<Todo>, (StatusCode, Json<ApiError>)> {
    if state.fail_updates {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new(ErrorCode::Internal, "update rejected")),
        ));
    }
    let mut todos = state.todos.lock().await;
    let Some(todo) = todos.iter_mut().find(|todo| todo.id.0 == id) else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiError::new(ErrorCode::NotFound, "todo not found")),
        ));
    };
    todo.title = body.title.trim().to_string();
    todo.completed = body.completed;
    Ok(Json(todo.clone()))
}

async fn delete_todo(
    State(state): State<StoreState>,
    Path(id): Path<i64>,
) -> std::result::Result<StatusCode, (StatusCode, Json<ApiError>)> {
    let mut todos = state.todos.lock().await;
    let before = todos.len();
    todos.retain(|todo| todo.id.0 != id);
    if todos.len() == before {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiError::new(ErrorCode::NotFound, "todo not found")),
        ));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn spawn_store_server(initial: Vec<Todo>, fail_updates: bool) -> Result<String> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let next_id = initial.iter().map(|todo| todo.id.0).max().unwrap_or(0) + 1;
    let state = StoreState {
        todos: Arc::new(Mutex::new(initial)),
        next_id: Arc::new(Mutex::new(next_id)),
        fail_updates,
    };
    let app = Router::new()
        .route("/todos", get(list_todos).post(create_todo))
        .route(
            "/todos/:id",
            axum::routing::patch(update_todo).delete(delete_todo),
        )
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

fn seeded(id: i64, user: i64, title: &str, completed: bool) -> Todo {
    Todo {
        id: TodoId(id),
        user_id: UserId(user),
        title: title.to_string(),
        completed,
    }
}

#[tokio::test]
async fn list_returns_only_the_owners_todos() {
    let server_url = spawn_store_server(
        vec![
            seeded(1, 1, "mine", false),
            seeded(2, 2, "someone else's", false),
            seeded(3, 1, "also mine", true),
        ],
        false,
    )
    .await
    .expect("spawn server");
    let store = HttpTodoStore::new(server_url, UserId(1));

    let todos = store.list().await.expect("list");

    assert_eq!(todos.len(), 2);
    assert!(todos.iter().all(|todo| todo.user_id == UserId(1)));
}

#[tokio::test]
async fn create_assigns_an_id_and_echoes_the_todo() {
    let server_url = spawn_store_server(Vec::new(), false)
        .await
        .expect("spawn server");
    let store = HttpTodoStore::new(server_url, UserId(7));

    let created = store.create("water the plants").await.expect("create");

    assert_eq!(created.title, "water the plants");
    assert_eq!(created.user_id, UserId(7));
    assert!(created.id.0 > 0);
    assert!(!created.completed);
}

#[tokio::test]
async fn update_patches_title_and_completed_state() {
    let server_url = spawn_store_server(vec![seeded(1, 1, "draft", false)], false)
        .await
        .expect("spawn server");
    let store = HttpTodoStore::new(server_url, UserId(1));

    let mut todo = seeded(1, 1, "final", false);
    todo.completed = true;
    let confirmed = store.update(&todo).await.expect("update");

    assert_eq!(confirmed.title, "final");
    assert!(confirmed.completed);
    let listed = store.list().await.expect("list");
    assert_eq!(listed[0].title, "final");
    assert!(listed[0].completed);
}

#[tokio::test]
async fn delete_removes_the_todo_remotely() {
    let server_url = spawn_store_server(
        vec![seeded(1, 1, "gone soon", true), seeded(2, 1, "stays", false)],
        false,
    )
    .await
    .expect("spawn server");
    let store = HttpTodoStore::new(server_url, UserId(1));

    store.delete(TodoId(1)).await.expect("delete");

    let listed = store.list().await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, TodoId(2));
}

#[tokio::test]
async fn failed_update_surfaces_the_structured_api_error() {
    let server_url = spawn_store_server(vec![seeded(1, 1, "task", false)], true)
        .await
        .expect("spawn server");
    let store = HttpTodoStore::new(server_url, UserId(1));

    let err = store
        .update(&seeded(1, 1, "task", true))
        .await
        .expect_err("update must fail");

    let api = err
        .downcast_ref::<ApiException>()
        .expect("ApiException cause");
    assert_eq!(api.code, ErrorCode::Internal);
    assert_eq!(api.message, "update rejected");
}

#[tokio::test]
async fn unknown_id_maps_to_a_not_found_exception() {
    let server_url = spawn_store_server(Vec::new(), false)
        .await
        .expect("spawn server");
    let store = HttpTodoStore::new(server_url, UserId(1));

    let err = store.delete(TodoId(42)).await.expect_err("must fail");

    let api = err
        .downcast_ref::<ApiException>()
        .expect("ApiException cause");
    assert_eq!(api.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn controller_round_trips_through_the_http_store() {
    let server_url = spawn_store_server(Vec::new(), false)
        .await
        .expect("spawn server");
    let store = Arc::new(HttpTodoStore::new(server_url, UserId(1)));
    let controller = TodoController::new(store, UserId(1));

    controller.load().await.expect("load");
    controller.add("from http").await.expect("add");
    controller.toggle_all().await.expect("toggle all");

    let view = controller.view().await;
    assert_eq!(view.completed_count, 1);
    assert!(view.all_completed);

    controller.clear_completed().await.expect("clear completed");
    assert!(controller.todos().await.is_empty());
}
