//! 组装完成的一幅逻辑图像.

use picbuf_core::SurfaceRef;

use crate::syntax::SliceType;

/// 图像类型, 取自首个 slice 的 slice_type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureType {
    I,
    P,
    B,
}

impl From<SliceType> for PictureType {
    fn from(slice_type: SliceType) -> Self {
        match slice_type {
            SliceType::I | SliceType::Si => Self::I,
            SliceType::P | SliceType::Sp => Self::P,
            SliceType::B => Self::B,
        }
    }
}

/// DPB 中跟踪的图像
///
/// `frame_idx` 对短期参考帧是 frame_num, 对长期参考帧是 LongTermFrameIdx,
/// 一幅图像不会同时是两者.
#[derive(Debug, Clone)]
pub struct Picture {
    /// 输出顺序键
    pub poc: i32,
    /// 短期: frame_num; 长期: LongTermFrameIdx
    pub frame_idx: u32,
    /// 码流中的 frame_num (提升为长期帧后保持不变)
    pub frame_num: u32,
    pub is_reference: bool,
    pub is_long_term: bool,
    /// 是否尚未交给输出消费者
    pub output_needed: bool,
    pub is_idr: bool,
    pub picture_type: PictureType,
    /// 解码顺序编号, 仅用于诊断
    pub decode_order: u64,
    /// 解码表面句柄, 与外部表面池共享
    pub surface: Option<SurfaceRef>,
}

impl Picture {
    /// 创建待输出的短期图像 (尚无解码表面)
    pub fn new(poc: i32, frame_num: u32, is_reference: bool) -> Self {
        Self {
            poc,
            frame_idx: frame_num,
            frame_num,
            is_reference,
            is_long_term: false,
            output_needed: true,
            is_idr: false,
            picture_type: PictureType::P,
            decode_order: 0,
            surface: None,
        }
    }

    /// 附加解码表面
    pub fn with_surface(mut self, surface: SurfaceRef) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn is_short_term_reference(&self) -> bool {
        self.is_reference && !self.is_long_term
    }

    pub fn is_long_term_reference(&self) -> bool {
        self.is_reference && self.is_long_term
    }

    /// 标记为长期参考帧
    pub fn set_long_term(&mut self, long_term_frame_idx: u32) {
        self.is_reference = true;
        self.is_long_term = true;
        self.frame_idx = long_term_frame_idx;
    }

    /// 标记为不参考
    pub(crate) fn demote(&mut self) {
        self.is_reference = false;
        self.is_long_term = false;
        self.frame_idx = self.frame_num;
    }

    /// 既不参考也不待输出的图像没有继续跟踪的必要
    pub(crate) fn is_finished(&self) -> bool {
        !self.is_reference && !self.output_needed
    }

    /// 表面编号, 无表面时为 None
    pub fn surface_id(&self) -> Option<u32> {
        self.surface.as_ref().map(|s| s.id)
    }
}
