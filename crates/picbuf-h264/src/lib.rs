//! # picbuf-h264
//!
//! H.264 解码器的参考帧生命周期管理.
//!
//! 输入是外部解析器产出的参数集与 slice header, 本 crate 负责:
//! - 把 slice 组装为图像, 丢弃首个 IDR 之前的数据
//! - 计算 POC (pic_order_cnt_type 0)
//! - 按 IDR / MMCO / 滑动窗口规则维护参考帧
//! - 在 DPB 中按 POC 顺序把图像交给输出回调
//!
//! 像素解码由实现 [`DecodeBackend`] 的外部后端完成.
//!
//! ## 使用示例
//!
//! ```rust
//! use picbuf_h264::{DpbConfig, NullBackend, Picture, Session};
//!
//! let session = Session::new(
//!     DpbConfig::default(),
//!     NullBackend::new(16, 16),
//!     Box::new(|picture: Picture| println!("输出 POC {}", picture.poc)),
//! )
//! .unwrap();
//! assert!(session.dpb().is_empty());
//! ```

pub mod assembler;
pub mod backend;
pub mod config;
pub mod dpb;
pub mod marking;
pub mod picture;
pub mod poc;
pub mod session;
pub mod syntax;
#[cfg(test)]
mod tests;

// 重导出常用类型
pub use assembler::{FrameAssembler, PictureInProgress};
pub use backend::{DecodeBackend, NullBackend, PictureInfo};
pub use config::DpbConfig;
pub use dpb::{Dpb, FrameNumContext, OutputCallback, POC_MAX, ReferenceFrame};
pub use marking::MarkingReport;
pub use picture::{Picture, PictureType};
pub use poc::PocState;
pub use session::{Session, SessionStats};
pub use syntax::{DecRefPicMarking, MmcoOp, Pps, Slice, SliceHeader, SliceType, Sps};
