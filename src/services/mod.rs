pub mod auth;
pub mod directory_service;
