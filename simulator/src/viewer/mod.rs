pub mod console;
pub mod model;
