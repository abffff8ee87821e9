pub mod cache;
pub mod events;
pub mod media;
pub mod posts;
pub mod search;
pub mod store;
