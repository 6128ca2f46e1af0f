//! 社交实时分发核心领域模型
//!
//! 包含用户/连接标识、在线会话、领域事件、离线通知，以及外部协作方接口。

pub mod errors;
pub mod events;
pub mod notification;
pub mod presence;
pub mod repositories;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use events::*;
pub use notification::*;
pub use presence::*;
pub use repositories::*;
pub use value_objects::*;
