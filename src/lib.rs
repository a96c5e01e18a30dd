pub mod api;
pub mod config;
pub mod events;
pub mod main_module;
pub mod maintenance;
pub mod shared;
pub mod store;
pub mod visibility;
