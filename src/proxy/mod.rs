pub mod handler;
pub mod transform;
pub mod upstream;
