pub mod addon;
pub mod health;
pub mod image;
