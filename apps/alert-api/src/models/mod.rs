pub mod acknowledgment;
pub mod alert;
pub mod reaction;
pub mod user;
