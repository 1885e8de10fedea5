// ============================================================================
// Action Queues
// ============================================================================
//
// One FIFO per member plus one background consumer per member. Producers
// append under a single submission lock so every member sees the same
// relative order; consumers drain independently.
//
// ============================================================================

pub mod action_queue;
pub(crate) mod consumer;
pub mod queue_list;

pub use action_queue::{ActionQueue, QueueEntry, same_action};
pub use queue_list::{ActionQueueList, SubmissionGuard};
