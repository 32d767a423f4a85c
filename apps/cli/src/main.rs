use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{HttpTodoStore, TodoController, TodoView};
use shared::domain::{Filter, Todo, TodoId, UserId};

#[derive(Parser, Debug)]
#[command(name = "todo-sync", about = "Todo list client synchronized against a remote store")]
struct Args {
    /// Base URL of the remote todo store.
    #[arg(long)]
    store_url: String,
    /// Owner id used for listing and creating todos.
    #[arg(long, default_value_t = 1)]
    user_id: i64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the todo list.
    List {
        #[arg(long, value_enum, default_value_t = FilterArg::All)]
        filter: FilterArg,
    },
    /// Create a todo with the given title.
    Add { title: String },
    /// Rename a todo; a blank title deletes it instead.
    Rename { id: i64, title: String },
    /// Flip the completed state of a todo.
    Toggle { id: i64 },
    /// Delete a todo.
    Delete { id: i64 },
    /// Drive every todo towards the common target state.
    ToggleAll,
    /// Delete every completed todo.
    ClearCompleted,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FilterArg {
    All,
    Active,
    Completed,
}

impl From<FilterArg> for Filter {
    fn from(value: FilterArg) -> Self {
        match value {
            FilterArg::All => Filter::All,
            FilterArg::Active => Filter::Active,
            FilterArg::Completed => Filter::Completed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let owner = UserId(args.user_id);
    let store = Arc::new(HttpTodoStore::new(args.store_url, owner));
    let controller = TodoController::new(store, owner);
    controller.load().await?;

    match args.command {
        Command::List { filter } => controller.set_filter(filter.into()).await,
        Command::Add { title } => controller.add(&title).await?,
        Command::Rename { id, title } => {
            let todo = find_todo(&controller, id).await?;
            controller.rename(&todo, &title).await?;
        }
        Command::Toggle { id } => {
            let todo = find_todo(&controller, id).await?;
            controller.toggle(&todo).await?;
        }
        Command::Delete { id } => controller.delete(TodoId(id)).await?,
        Command::ToggleAll => controller.toggle_all().await?,
        Command::ClearCompleted => controller.clear_completed().await?,
    }

    render(&controller.view().await);
    Ok(())
}

async fn find_todo(controller: &TodoController, id: i64) -> Result<Todo> {
    controller
        .todos()
        .await
        .into_iter()
        .find(|todo| todo.id.0 == id)
        .ok_or_else(|| anyhow!("no todo with id {id}"))
}

fn render(view: &TodoView) {
    for todo in &view.todos {
        let mark = if todo.completed { "x" } else { " " };
        println!("[{mark}] {:>4}  {}", todo.id.0, todo.title);
    }
    let noun = if view.active_count == 1 { "item" } else { "items" };
    println!("{} {noun} left", view.active_count);
    if let Some(message) = &view.error_message {
        eprintln!("error: {message}");
    }
}
