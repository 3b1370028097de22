pub mod clients;
pub mod utils;

pub use clients::{SnsModule, SnsOperations, SqsModule, SqsOperations};
