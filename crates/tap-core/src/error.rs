//! tap 工作区共享的错误域。
//!
//! # 教案定位（Why）
//! - 缓冲层的越界、池生命周期违例与编解码层的解码失败需要合流为统一的
//!   错误形态，以便调用方与测试按稳定错误码精确断言；
//! - 框架需兼容 `no_std + alloc` 场景，因此不依赖 `std::error::Error`，
//!   而是提供本地的对象安全 [`Error`] 抽象。
//!
//! # 使用契约（What）
//! - 错误码一律取自 [`codes`] 模块或遵循 `<领域>.<语义>` 约定的自定义值；
//! - `message` 面向排障人员，不承载机读语义；机读语义只看 `code`。
//!
//! # 设计考量（How）
//! - `code` 为 `'static` 字符串，比较与聚合零成本；
//! - `cause` 可选，保持错误链与 `std::error::Error::source` 一致的语义。

use alloc::{borrow::Cow, boxed::Box};
use core::fmt;

/// tap 工作区的 `Result` 别名，默认错误类型为 [`CoreError`]。
pub type Result<T, E = CoreError> = core::result::Result<T, E>;

/// `no_std` 环境下的对象安全错误抽象。
///
/// # 设计背景（Why）
/// - `std::error::Error` 在 `no_std` 中不可用；本 trait 作为错误链的最小
///   公共接口，语义与 `source` 约定保持一致。
///
/// # 契约说明（What）
/// - **前置条件**：实现类型为 `'static`，若需要跨线程传递应同时满足
///   `Send + Sync`；
/// - **后置条件**：`source` 返回引用的生命周期受限于 `self`。
pub trait Error: fmt::Debug + fmt::Display {
    /// 返回当前错误的上游来源，链路终点返回 `None`。
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

impl<E> Error for Box<E>
where
    E: Error + ?Sized,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        (**self).source()
    }
}

/// 错误链中承载底层原因的装箱别名。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

/// `CoreError` 是跨 crate 共享的稳定错误形态。
///
/// # 设计背景（Why）
/// - 缓冲与编解码层的故障必须以稳定识别符呈现，测试与上游治理逻辑
///   依赖 `code` 而非消息文本做分支；
/// - 错误在捕包热路径上构造，保持结构轻量、避免强制堆分配
///   （`&'static str` 消息不触发分配）。
///
/// # 契约说明（What）
/// - `code`：稳定错误码，见 [`codes`]；
/// - `message`：人读描述，不含敏感信息；
/// - `cause`：可选底层原因，保持错误链顺序。
///
/// # 设计取舍（Trade-offs）
/// - 使用 `Cow<'static, str>` 存储消息，静态文本零分配、动态文本一次分配，
///   在诊断灵活性与热路径成本之间取得平衡。
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<ErrorCause>,
}

impl CoreError {
    /// 构造核心错误。
    ///
    /// # 契约说明
    /// - **参数**：`code` 取自 [`codes`] 或遵循 `<领域>.<语义>` 约定；
    ///   `message` 可为静态或动态文本；
    /// - **后置条件**：返回值不含底层原因，可通过 [`Self::with_cause`] 附加。
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// 附带底层原因并返回新的核心错误。
    #[must_use]
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 返回稳定错误码。
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 返回人读消息。
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 返回底层原因（若有）。
    #[must_use]
    pub fn cause(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|cause| cause as &dyn Error)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause()
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CoreError {}

/// 框架内置的错误码常量集合，确保断言与日志具有稳定识别符。
///
/// # 契约说明（What）
/// - 错误码遵循 `<领域>.<语义>` 命名约定；
/// - 调用方收到这些错误码后可据此区分编程错误（池生命周期违例、越界）
///   与外部数据问题（解码失败），后者不代表进程状态损坏。
pub mod codes {
    /// 索引或长度落在缓冲有效区间之外，或剩余可读/可写字节不足。
    pub const BUFFER_OUT_OF_BOUNDS: &str = "buffer.out_of_bounds";
    /// 请求的容量超过 `max_capacity` 上限。
    pub const BUFFER_CAPACITY_EXCEEDED: &str = "buffer.capacity_exceeded";
    /// 池中已无空闲槽位；分配立即失败，不排队等待。
    pub const BUFFER_POOL_EXHAUSTED: &str = "buffer.pool_exhausted";
    /// 引用计数已归零的缓冲被再次访问、retain 或 release。
    pub const BUFFER_RELEASED: &str = "buffer.released";
    /// 协议字段不满足格式约束，解码失败。
    pub const PROTOCOL_DECODE: &str = "protocol.decode";
    /// 构建/重写报文时必填字段缺失。
    pub const PROTOCOL_MISSING_FIELD: &str = "protocol.missing_field";
    /// 构建报文时字段取值违反协议格式约束。
    pub const PROTOCOL_INVALID_FIELD: &str = "protocol.invalid_field";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_code_and_message() {
        let err = CoreError::new(codes::BUFFER_OUT_OF_BOUNDS, "index 9 超出容量 8");
        assert_eq!(err.code(), codes::BUFFER_OUT_OF_BOUNDS);
        assert!(alloc::format!("{err}").contains("buffer.out_of_bounds"));
    }

    #[test]
    fn cause_chain_is_preserved() {
        let inner = CoreError::new(codes::BUFFER_RELEASED, "not in pool");
        let outer = CoreError::new(codes::PROTOCOL_DECODE, "载荷缓冲不可用").with_cause(inner);
        let source = outer.cause().expect("外层错误应携带底层原因");
        assert!(alloc::format!("{source}").contains("buffer.released"));
    }
}
