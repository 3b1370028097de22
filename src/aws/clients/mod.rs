pub mod sns;
pub mod sqs;
pub mod traits;

pub use sns::SnsModule;
pub use sqs::{InboundMessage, ReceiveRequest, SqsModule};
pub use traits::*;
