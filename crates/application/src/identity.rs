use async_trait::async_trait;
use domain::UserId;

use crate::error::ApplicationError;

/// 连接握手时携带的凭证
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

/// 把凭证解析为用户标识；失败时连接必须被拒绝
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, credentials: &Credentials) -> Result<UserId, ApplicationError>;
}
