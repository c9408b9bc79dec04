//! Boundary to the systems that own users and boards.
//!
//! Identity, board membership and board contents are decided elsewhere; the
//! sync core only asks. [`MemoryDirectory`] answers those questions from
//! seed data so a standalone server (and the tests) have someone to ask.

use futures::future::{self, BoxFuture};
use std::collections::{HashMap, HashSet};

use crate::config::{BoardSeed, UserSeed};
use crate::models::{Identity, SharedObject, UserId};

/// Resolves a bearer credential to a user.
pub trait IdentityResolver: Send + Sync {
    fn resolve<'a>(&'a self, credential: &'a str) -> BoxFuture<'a, Option<Identity>>;
}

/// Board existence, membership and current contents.
pub trait BoardDirectory: Send + Sync {
    /// Whether `user_id` may join `board_id`.
    fn has_access<'a>(&'a self, board_id: &'a str, user_id: UserId) -> BoxFuture<'a, bool>;

    /// Current objects on the board, or `None` if the board does not exist.
    fn snapshot<'a>(&'a self, board_id: &'a str) -> BoxFuture<'a, Option<Vec<SharedObject>>>;
}

#[derive(Debug, Clone)]
struct BoardEntry {
    members: HashSet<UserId>,
    objects: Vec<SharedObject>,
}

/// Static in-memory directory built from configuration.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    users_by_token: HashMap<String, Identity>,
    boards: HashMap<String, BoardEntry>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seeds(users: &[UserSeed], boards: &[BoardSeed]) -> Self {
        let mut directory = Self::new();
        for user in users {
            directory = directory.with_user(user.id, &user.name, &user.token);
        }
        for board in boards {
            directory.boards.insert(
                board.id.clone(),
                BoardEntry {
                    members: board.members.iter().copied().collect(),
                    objects: board.objects.clone(),
                },
            );
        }
        directory
    }

    pub fn with_user(mut self, id: UserId, name: &str, token: &str) -> Self {
        self.users_by_token
            .insert(token.to_string(), Identity::new(id, name));
        self
    }

    pub fn with_board(
        mut self,
        board_id: &str,
        members: impl IntoIterator<Item = UserId>,
        objects: Vec<SharedObject>,
    ) -> Self {
        self.boards.insert(
            board_id.to_string(),
            BoardEntry {
                members: members.into_iter().collect(),
                objects,
            },
        );
        self
    }

    pub fn user_count(&self) -> usize {
        self.users_by_token.len()
    }

    pub fn board_count(&self) -> usize {
        self.boards.len()
    }
}

impl IdentityResolver for MemoryDirectory {
    fn resolve<'a>(&'a self, credential: &'a str) -> BoxFuture<'a, Option<Identity>> {
        Box::pin(future::ready(self.users_by_token.get(credential).cloned()))
    }
}

impl BoardDirectory for MemoryDirectory {
    fn has_access<'a>(&'a self, board_id: &'a str, user_id: UserId) -> BoxFuture<'a, bool> {
        let allowed = self
            .boards
            .get(board_id)
            .is_some_and(|board| board.members.contains(&user_id));
        Box::pin(future::ready(allowed))
    }

    fn snapshot<'a>(&'a self, board_id: &'a str) -> BoxFuture<'a, Option<Vec<SharedObject>>> {
        Box::pin(future::ready(
            self.boards.get(board_id).map(|board| board.objects.clone()),
        ))
    }
}
