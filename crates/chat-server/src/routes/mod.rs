pub mod directories;
pub mod events;
pub mod sessions;
pub mod stream;
pub mod ws;
