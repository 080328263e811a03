//! Transition table and state derivation.
//!
//! Everything here is pure: no storage, no failure modes.

use crate::types::{BlockedBy, TaskState};

/// Allowed targets for each state. BLOCKED cannot jump straight to ACTIVE;
/// its blockers have to clear first.
pub fn valid_next_states(state: TaskState) -> &'static [TaskState] {
    match state {
        TaskState::Active => &[TaskState::Waiting, TaskState::Blocked, TaskState::Done],
        TaskState::Waiting => &[TaskState::Active, TaskState::Blocked, TaskState::Done],
        TaskState::Blocked => &[TaskState::Waiting, TaskState::Done],
        TaskState::Done => &[TaskState::Active],
    }
}

/// A transition to the current state is rejected, not treated as a no-op.
pub fn is_valid_transition(from: TaskState, to: TaskState) -> bool {
    from != to && valid_next_states(from).contains(&to)
}

/// Reconcile a requested state with the task's blockers.
///
/// DONE always wins (force-complete). Otherwise any outstanding blocker
/// forces BLOCKED.
pub fn derive_state(blocked_by: &BlockedBy, desired: TaskState) -> TaskState {
    if desired == TaskState::Done {
        return TaskState::Done;
    }
    if !blocked_by.is_empty() {
        return TaskState::Blocked;
    }
    desired
}

/// State after a `task_block` has been stripped: DONE is kept, otherwise
/// BLOCKED while entries remain and WAITING once none do.
pub fn state_after_release(current: TaskState, blocked_by: &BlockedBy) -> TaskState {
    if current == TaskState::Done {
        TaskState::Done
    } else {
        blocked_state(blocked_by)
    }
}

/// BLOCKED if anything still blocks, WAITING otherwise.
pub fn blocked_state(blocked_by: &BlockedBy) -> TaskState {
    if blocked_by.is_empty() {
        TaskState::Waiting
    } else {
        TaskState::Blocked
    }
}
