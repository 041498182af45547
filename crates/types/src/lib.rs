pub mod error;
pub mod instance;
pub mod query;
pub mod statement;
pub mod status;
pub mod task;

pub use error::*;
pub use instance::*;
pub use query::*;
pub use statement::*;
pub use status::*;
pub use task::*;
