//! Web API 层。
//!
//! 提供 Axum 路由与 WebSocket 连接处理，将请求委托给应用层的分发与在线状态服务。

mod auth;
mod error;
mod protocol;
mod routes;
mod state;
mod ws_connection;

pub use auth::{bearer_token, Claims, JwtService};
pub use config::{FanoutConfig, JwtConfig};
pub use error::ApiError;
pub use protocol::{ClientCommand, PostAction, ProtocolError};
pub use routes::router;
pub use state::AppState;
