//! In-memory adapters for the task ports.

mod collaborators;
mod task;

pub use collaborators::{InMemoryGenerator, InMemoryNotifier, InMemoryPublisher};
pub use task::InMemoryTaskRepository;
