//! DPB 运行时配置.

use picbuf_core::{PicbufError, PicbufResult};

use crate::dpb::MAX_REFERENCE_FRAMES;

/// 参考帧容量默认值
pub const DEFAULT_MAX_REF_FRAMES: u32 = MAX_REFERENCE_FRAMES as u32;

/// 长期帧索引上限默认值, -1 表示不允许长期参考帧
pub const DEFAULT_MAX_LONG_TERM_FRAME_IDX: i32 = -1;

/// 两个可在运行时修改的 DPB 属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DpbConfig {
    /// 参考帧容量上限 (0-16), 与 SPS 的 max_num_ref_frames 取较小值
    pub max_ref_frames: u32,
    /// 长期帧索引上限 (-1..=i32::MAX)
    pub max_long_term_frame_idx: i32,
}

impl Default for DpbConfig {
    fn default() -> Self {
        Self {
            max_ref_frames: DEFAULT_MAX_REF_FRAMES,
            max_long_term_frame_idx: DEFAULT_MAX_LONG_TERM_FRAME_IDX,
        }
    }
}

impl DpbConfig {
    pub fn validate(&self) -> PicbufResult<()> {
        validate_max_ref_frames(self.max_ref_frames)?;
        validate_max_long_term_frame_idx(self.max_long_term_frame_idx)
    }

    /// 长期帧索引上限, -1 映射为 None
    pub fn long_term_ceiling(&self) -> Option<u32> {
        long_term_ceiling(self.max_long_term_frame_idx)
    }
}

pub(crate) fn validate_max_ref_frames(value: u32) -> PicbufResult<()> {
    if value as usize > MAX_REFERENCE_FRAMES {
        return Err(PicbufError::InvalidArgument(format!(
            "max_ref_frames 超出范围, value={}, max={}",
            value, MAX_REFERENCE_FRAMES
        )));
    }
    Ok(())
}

pub(crate) fn validate_max_long_term_frame_idx(value: i32) -> PicbufResult<()> {
    if value < -1 {
        return Err(PicbufError::InvalidArgument(format!(
            "max_long_term_frame_idx 超出范围, value={}, min=-1",
            value
        )));
    }
    Ok(())
}

pub(crate) fn long_term_ceiling(value: i32) -> Option<u32> {
    u32::try_from(value).ok()
}
