pub mod audit;
pub mod config;
pub mod error;
pub mod store;
pub mod validation;

pub mod api;
pub mod auth;
pub mod rbac;

pub mod notify;
pub mod repo;
