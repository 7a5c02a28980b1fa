pub mod memory;
pub mod users;
