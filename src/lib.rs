//! # picbuf
//!
//! 纯 Rust 实现的 H.264 参考帧生命周期管理.
//!
//! 给定外部解析器产出的参数集与 slice header, picbuf 决定:
//! - 哪些已解码图像需要保留为预测参考
//! - 参考图像何时不再被参考
//! - 完成的图像以何种顺序 (POC 顺序, 而非解码顺序) 交给消费者
//!
//! # 快速开始
//!
//! ```rust
//! use picbuf::h264::{DpbConfig, NullBackend, Picture, Session};
//!
//! let mut session = Session::new(
//!     DpbConfig::default(),
//!     NullBackend::new(1920, 1080),
//!     Box::new(|picture: Picture| println!("输出 POC {}", picture.poc)),
//! )
//! .unwrap();
//! session.end_of_stream().unwrap();
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `picbuf-core` | 错误类型与解码表面句柄 |
//! | `picbuf-h264` | POC 计算、帧组装、参考帧标记与 DPB |

/// 核心类型: 错误与解码表面
pub use picbuf_core as core;

/// H.264 参考帧管理
pub use picbuf_h264 as h264;

/// 获取 picbuf 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
