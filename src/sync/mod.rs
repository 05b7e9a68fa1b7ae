pub mod subscription;

pub use subscription::{StreamSubscription, SyncMode};
