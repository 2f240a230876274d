//! # picbuf-core
//!
//! picbuf 参考帧管理的核心类型: 统一错误处理与解码表面句柄.

pub mod error;
pub mod surface;

// 重导出常用类型
pub use error::{PicbufError, PicbufResult, ReferenceKind};
pub use surface::{DecodedSurface, SurfaceRef};
