//! 统一错误类型定义.
//!
//! 所有 picbuf crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// picbuf 统一错误类型
#[derive(Debug, Error)]
pub enum PicbufError {
    /// 无效参数 (配置越界等)
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的码流特性 (POC type 1/2, 场编码等)
    #[error("不支持的码流特性: {0}")]
    Unsupported(String),

    /// DPB 已满且没有可以输出的图像
    #[error("DPB 已满, 无可腾挪的图像: 容量={capacity}, 已存储={stored}")]
    DpbFull { capacity: usize, stored: usize },

    /// 标记操作引用了 DPB 中不存在的图像
    ///
    /// 属于软错误: 可能是损坏码流的迹象, 但不会中断解码.
    #[error("未找到参考帧: {kind} 编号 {pic_num}")]
    ReferenceNotFound { kind: ReferenceKind, pic_num: i32 },

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 外部解码后端错误
    #[error("解码后端错误: {0}")]
    Backend(String),

    /// 会话已因致命错误终止, 需要 reset 后才能继续
    #[error("会话已终止: {0}")]
    SessionTerminated(String),
}

/// 参考帧寻址方式, 用于区分标记失败的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// 按 picNum 寻址的短期参考帧
    ShortTerm,
    /// 按 LongTermPicNum 寻址的长期参考帧
    LongTerm,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShortTerm => write!(f, "短期参考帧"),
            Self::LongTerm => write!(f, "长期参考帧"),
        }
    }
}

impl PicbufError {
    /// 是否为软错误 (记录后可以继续解码)
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::ReferenceNotFound { .. })
    }

    /// 是否为致命错误 (当前流必须终止)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DpbFull { .. }
                | Self::Unsupported(_)
                | Self::Backend(_)
                | Self::SessionTerminated(_)
        )
    }
}

/// picbuf 统一 Result 类型
pub type PicbufResult<T> = Result<T, PicbufError>;
