//! 外部解码后端接口.
//!
//! 后端接收图像信息 (含 16 槽参考帧列表) 与当前图像的 slice 数据,
//! 返回解码表面. 像素解码本身不在本 crate 范围内.

use picbuf_core::{DecodedSurface, PicbufResult, SurfaceRef};

use crate::dpb::{MAX_REFERENCE_FRAMES, ReferenceFrame};
use crate::syntax::Slice;

/// 提交给解码后端的图像信息
#[derive(Debug, Clone)]
pub struct PictureInfo {
    pub frame_num: u32,
    pub poc: i32,
    pub is_reference: bool,
    pub is_idr: bool,
    pub num_ref_frames: u32,
    pub log2_max_frame_num: u32,
    pub poc_type: u32,
    pub log2_max_poc_lsb: u32,
    pub slice_count: usize,
    pub reference_frames: [ReferenceFrame; MAX_REFERENCE_FRAMES],
}

impl PictureInfo {
    /// 参考帧列表中的有效槽位数
    pub fn valid_references(&self) -> usize {
        self.reference_frames
            .iter()
            .filter(|slot| slot.is_valid())
            .count()
    }
}

/// 解码后端
pub trait DecodeBackend {
    /// 解码一幅图像, 返回共享的解码表面
    fn decode(&mut self, info: &PictureInfo, slices: &[Slice]) -> PicbufResult<SurfaceRef>;
}

/// 不做像素解码的后端: 只分配表面句柄
///
/// 表面池自身对每个表面保留一个强引用, 便于核对 DPB 与消费者的引用是否全部归还.
#[derive(Debug, Default)]
pub struct NullBackend {
    width: u32,
    height: u32,
    next_id: u32,
    pool: Vec<SurfaceRef>,
    /// 每次解码请求的参考帧槽位数, 按解码顺序
    submitted_refs: Vec<usize>,
}

impl NullBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// 已分配的表面
    pub fn pool(&self) -> &[SurfaceRef] {
        &self.pool
    }

    /// 池外仍被持有的强引用总数
    pub fn outstanding_refs(&self) -> usize {
        self.pool
            .iter()
            .map(|surface| picbuf_core::surface::strong_refs(surface) - 1)
            .sum()
    }

    pub fn submitted_refs(&self) -> &[usize] {
        &self.submitted_refs
    }
}

impl DecodeBackend for NullBackend {
    fn decode(&mut self, info: &PictureInfo, _slices: &[Slice]) -> PicbufResult<SurfaceRef> {
        let surface = DecodedSurface::new(self.next_id, self.width, self.height).into_shared();
        self.next_id = self.next_id.wrapping_add(1);
        self.pool.push(SurfaceRef::clone(&surface));
        self.submitted_refs.push(info.valid_references());
        Ok(surface)
    }
}
