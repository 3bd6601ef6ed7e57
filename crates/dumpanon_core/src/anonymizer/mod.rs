pub mod hashing;
pub mod json;
pub mod rules;
pub mod table;
pub mod transforms;

pub use hashing::*;
pub use json::*;
pub use rules::*;
pub use table::*;
pub use transforms::*;
