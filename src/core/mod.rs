pub mod engine;
pub mod graph;
pub mod state;
pub mod task_service;

pub use engine::StateEngine;
pub use graph::TaskStore;
pub use task_service::TaskService;
