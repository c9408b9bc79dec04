use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::AppState;
use crate::config::HubConfig;
use crate::directory::MemoryDirectory;
use crate::models::SharedObject;

pub const BOARD_ID: &str = "board-1";
pub const ALICE_TOKEN: &str = "alice-token";
pub const BOB_TOKEN: &str = "bob-token";
/// A real user who is not a member of [`BOARD_ID`]
pub const CAROL_TOKEN: &str = "carol-token";

/// Directory with three users and one board shared by Alice and Bob,
/// holding a single seeded rectangle.
pub fn test_directory() -> MemoryDirectory {
    let seeded = SharedObject {
        kind: "rectangle".into(),
        x: 10.0,
        y: 20.0,
        width: 100.0,
        height: 50.0,
        color: "#336699".into(),
        ..SharedObject::bare("shape-1")
    };
    MemoryDirectory::new()
        .with_user(1, "Alice", ALICE_TOKEN)
        .with_user(2, "Bob", BOB_TOKEN)
        .with_user(3, "Carol", CAROL_TOKEN)
        .with_board(BOARD_ID, [1, 2], vec![seeded])
        .with_board("board-2", [1, 2, 3], Vec::new())
}

/// Build a fully-wired `AppState` over [`test_directory`] with default hub
/// settings. Must be called inside a tokio runtime; the registry task is
/// returned so callers can keep or drop it.
pub fn test_app_state() -> (AppState, JoinHandle<()>) {
    test_app_state_with(HubConfig::default())
}

pub fn test_app_state_with(hub: HubConfig) -> (AppState, JoinHandle<()>) {
    let directory = Arc::new(test_directory());
    AppState::new(directory.clone(), directory, hub)
}

/// Poll the registry until `board_id` has `expected` members.
pub async fn wait_for_members(state: &AppState, board_id: &str, expected: usize) {
    for _ in 0..200 {
        let size = state
            .registry
            .room_sizes()
            .await
            .get(board_id)
            .copied()
            .unwrap_or(0);
        if size == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("board {board_id} never reached {expected} members");
}
