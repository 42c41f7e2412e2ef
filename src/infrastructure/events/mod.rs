//! Events Layer - 进度事件推送

mod publisher;

pub use publisher::ProgressPublisher;
