#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

//! # tap-core
//!
//! ## 教案目的（Why）
//! - **定位**：为 tap 工作区的缓冲库（`tap-buffer`）与协议编解码套件（`tap-codec-*`）
//!   提供共享的最底层契约：稳定错误域与协议号登记设施。
//! - **架构角色**：所有上层 crate 只通过本 crate 交换错误与协议标识，
//!   使缓冲实现与具体协议实现之间不存在直接依赖。
//! - **设计策略**：保持 `no_std + alloc` 可用，错误与注册表均不绑定任何
//!   平台设施，方便在捕包热路径与测试环境中同样运转。
//!
//! ## 交互契约（What）
//! - [`CoreError`] 承载稳定错误码（`codes` 模块）与人读消息；
//! - [`ProtocolId`] / [`EtherType`] 以封闭枚举 + `Other(n)` 的形式对协议号做
//!   全函数映射，未知值永远不会构成错误；
//! - [`NameRegistry`] 提供“数字键 → 可读描述”的运行期注册表，
//!   查询缺失时返回 `UNKNOWN` 哨兵而非失败。
//!
//! ## 实现策略（How）
//! - 错误域复用 `<领域>.<语义>` 的错误码命名约定，便于日志与断言聚合；
//! - 注册表以 `spin::RwLock` 守护的有序表实现，读多写少，注册即覆盖。

extern crate alloc;

pub mod error;
pub mod registry;

pub use error::{CoreError, Error, Result, codes};
pub use registry::{EtherType, NameRegistry, ProtocolId, UNKNOWN};
