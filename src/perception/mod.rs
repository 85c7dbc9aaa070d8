pub mod crop;
pub mod description;
pub mod marker;
pub mod types;
