pub mod schema;
pub mod section_repo;
pub mod task_repo;

pub use schema::open_db;
