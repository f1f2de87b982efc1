pub mod chat;
pub mod common;
pub mod history;
pub mod image;

pub use chat::*;
pub use common::*;
pub use history::*;
pub use image::*;
