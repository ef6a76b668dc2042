pub mod display;
pub mod local_storage;
