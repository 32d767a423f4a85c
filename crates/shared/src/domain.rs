use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(TodoId);
id_newtype!(UserId);

/// Reserved id for a todo created locally but not yet confirmed by the
/// remote store. At most one item in a collection may carry it.
pub const PENDING_TODO_ID: TodoId = TodoId(-1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: TodoId,
    pub user_id: UserId,
    pub title: String,
    pub completed: bool,
}

impl Todo {
    /// Placeholder appended optimistically while a remote create is in
    /// flight; replaced by the confirmed item or removed on failure.
    pub fn pending(owner: UserId, title: impl Into<String>) -> Self {
        Self {
            id: PENDING_TODO_ID,
            user_id: owner,
            title: title.into(),
            completed: false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.id == PENDING_TODO_ID
    }
}

/// View selector over a todo collection. UI state only, never sent to
/// the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    #[default]
    All,
    Active,
    Completed,
}

impl Filter {
    pub fn matches(&self, todo: &Todo) -> bool {
        match self {
            Filter::All => true,
            Filter::Active => !todo.completed,
            Filter::Completed => todo.completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn todo(id: i64, completed: bool) -> Todo {
        Todo {
            id: TodoId(id),
            user_id: UserId(1),
            title: format!("todo {id}"),
            completed,
        }
    }

    #[test]
    fn filter_all_matches_everything() {
        assert!(Filter::All.matches(&todo(1, false)));
        assert!(Filter::All.matches(&todo(2, true)));
    }

    #[test]
    fn filter_active_and_completed_partition_by_state() {
        let open = todo(1, false);
        let done = todo(2, true);
        assert!(Filter::Active.matches(&open));
        assert!(!Filter::Active.matches(&done));
        assert!(!Filter::Completed.matches(&open));
        assert!(Filter::Completed.matches(&done));
    }

    #[test]
    fn pending_todo_carries_sentinel_id_and_open_state() {
        let pending = Todo::pending(UserId(7), "buy milk");
        assert!(pending.is_pending());
        assert_eq!(pending.id, PENDING_TODO_ID);
        assert!(!pending.completed);
        assert!(!todo(3, false).is_pending());
    }
}
