pub mod core;
pub mod instructor;
pub mod results;
pub mod student;
