pub mod courses;
pub mod system;
