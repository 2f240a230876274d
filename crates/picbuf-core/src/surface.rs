//! 解码表面句柄.
//!
//! 像素存储由外部表面池持有, 本 crate 只描述句柄本身.
//! 句柄通过 `Arc` 共享:
//! - DPB 在图像入库时持有一个强引用, 图像从 DPB 移除时释放
//! - 输出消费者收到自己的克隆, 显示完毕后释放

use std::sync::Arc;

/// 外部解码后端产出的一块解码表面
#[derive(Debug, PartialEq, Eq)]
pub struct DecodedSurface {
    /// 表面编号 (由表面池分配, 池内唯一)
    pub id: u32,
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
}

/// 共享的解码表面句柄
pub type SurfaceRef = Arc<DecodedSurface>;

impl DecodedSurface {
    /// 创建表面描述
    pub fn new(id: u32, width: u32, height: u32) -> Self {
        Self { id, width, height }
    }

    /// 包装为共享句柄
    pub fn into_shared(self) -> SurfaceRef {
        Arc::new(self)
    }
}

impl Drop for DecodedSurface {
    fn drop(&mut self) {
        log::trace!("解码表面已释放: id={}", self.id);
    }
}

/// 当前句柄的强引用数量, 便于诊断引用泄漏
pub fn strong_refs(surface: &SurfaceRef) -> usize {
    Arc::strong_count(surface)
}
