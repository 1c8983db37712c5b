pub mod account;
pub mod book;

pub use account::*;
pub use book::*;
