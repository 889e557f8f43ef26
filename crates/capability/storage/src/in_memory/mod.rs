//! 内存点位存储
//!
//! 保存每个点位的最新值与最近的推送历史，用于测试和本地演示。

pub mod point;

pub use point::*;
