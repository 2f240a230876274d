//! 解码图像缓冲区 (DPB).
//!
//! 存储仍被参考或尚待输出的图像, 负责:
//! - bump: 按 POC 从小到大把待输出图像交给输出回调
//! - 参考帧标记: 滑动窗口、MMCO 各操作、长期帧索引上限
//!
//! `frames` 的插入顺序具有语义: POC 相同时先入库者先输出.

use log::{debug, trace, warn};
use picbuf_core::{PicbufError, PicbufResult, ReferenceKind};

use crate::picture::Picture;

/// bump 的无上限 POC
pub const POC_MAX: i32 = i32::MAX;

/// 参考帧列表长度 (也是 DPB 容量上限)
pub const MAX_REFERENCE_FRAMES: usize = 16;

/// 输出回调, 每幅到达输出的图像恰好调用一次, 按 POC 顺序
pub type OutputCallback = Box<dyn FnMut(Picture) + Send>;

// ============================================================
// 帧号回绕
// ============================================================

/// 当前图像的帧号上下文, 用于把 frame_num 换算为 picNum (FrameNumWrap)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameNumContext {
    cur_frame_num: u32,
    /// MaxFrameNum, 0 表示不做回绕换算
    max_frame_num: u32,
}

impl FrameNumContext {
    pub fn new(cur_frame_num: u32, max_frame_num: u32) -> Self {
        Self {
            cur_frame_num,
            max_frame_num,
        }
    }

    /// CurrPicNum
    pub fn curr_pic_num(&self) -> i32 {
        match self.max_frame_num {
            0 => self.cur_frame_num as i32,
            max => (self.cur_frame_num % max) as i32,
        }
    }

    /// FrameNumWrap: 大于当前帧号的 frame_num 属于上一轮回绕
    pub fn pic_num(&self, frame_num: u32) -> i32 {
        let max = self.max_frame_num;
        if max == 0 {
            return frame_num as i32;
        }
        let cur = self.cur_frame_num % max;
        let val = frame_num % max;
        if val > cur {
            val as i32 - max as i32
        } else {
            val as i32
        }
    }
}

// ============================================================
// 参考帧列表
// ============================================================

/// 交给外部解码后端的参考帧描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceFrame {
    /// 解码表面编号, None 表示无效槽位
    pub surface_id: Option<u32>,
    pub poc: i32,
    pub frame_idx: u32,
    pub is_reference: bool,
    pub is_long_term: bool,
}

impl ReferenceFrame {
    /// 空槽位
    pub const INVALID: Self = Self {
        surface_id: None,
        poc: 0,
        frame_idx: 0,
        is_reference: false,
        is_long_term: false,
    };

    pub fn is_valid(&self) -> bool {
        self.surface_id.is_some()
    }
}

impl From<&Picture> for ReferenceFrame {
    fn from(pic: &Picture) -> Self {
        Self {
            surface_id: pic.surface_id(),
            poc: pic.poc,
            frame_idx: pic.frame_idx,
            is_reference: pic.is_reference,
            is_long_term: pic.is_long_term,
        }
    }
}

// ============================================================
// DPB
// ============================================================

/// 解码图像缓冲区
pub struct Dpb {
    /// 按入库顺序排列的图像
    frames: Vec<Picture>,
    max_frames: usize,
    /// 长期帧索引上限, None 表示不允许长期参考帧
    max_longterm_frame_idx: Option<u32>,
    frame_num_ctx: FrameNumContext,
    output: OutputCallback,
    output_count: u64,
}

impl std::fmt::Debug for Dpb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dpb")
            .field("frames", &self.frames)
            .field("max_frames", &self.max_frames)
            .field("max_longterm_frame_idx", &self.max_longterm_frame_idx)
            .field("output_count", &self.output_count)
            .finish()
    }
}

impl Dpb {
    /// 创建 DPB, 容量超过 16 时截断
    pub fn new(max_frames: usize, output: OutputCallback) -> Self {
        Self {
            frames: Vec::with_capacity(MAX_REFERENCE_FRAMES),
            max_frames: max_frames.min(MAX_REFERENCE_FRAMES),
            max_longterm_frame_idx: None,
            frame_num_ctx: FrameNumContext::default(),
            output,
            output_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 按入库顺序访问已存储的图像
    pub fn pictures(&self) -> &[Picture] {
        &self.frames
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    pub fn max_longterm_frame_idx(&self) -> Option<u32> {
        self.max_longterm_frame_idx
    }

    /// 已输出的图像总数
    pub fn output_count(&self) -> u64 {
        self.output_count
    }

    /// 当前参考帧 (短期 + 长期) 数量
    pub fn num_reference_frames(&self) -> usize {
        self.frames.iter().filter(|pic| pic.is_reference).count()
    }

    pub fn frame_num_context(&self) -> FrameNumContext {
        self.frame_num_ctx
    }

    /// 更新当前图像的帧号上下文, 标记操作按它换算 picNum
    pub fn set_frame_num_context(&mut self, ctx: FrameNumContext) {
        self.frame_num_ctx = ctx;
    }

    /// 长期帧索引是否在上限之内
    pub fn long_term_idx_allowed(&self, long_term_frame_idx: u32) -> bool {
        self.max_longterm_frame_idx
            .is_some_and(|max| long_term_frame_idx <= max)
    }

    // ------------------------------------------------------------
    // 入库与输出
    // ------------------------------------------------------------

    /// 图像入库
    ///
    /// 参考图像: DPB 满时持续 bump, 无图可 bump 则返回 `DpbFull`.
    /// 非参考图像: 先输出所有 POC 更小的待输出图像, 再直接输出自身, 不入库.
    pub fn add(&mut self, mut picture: Picture) -> PicbufResult<()> {
        if picture.is_long_term && !self.long_term_idx_allowed(picture.frame_idx) {
            debug!(
                "H264: 长期帧索引超出上限, 降为不参考, idx={}, max={:?}",
                picture.frame_idx, self.max_longterm_frame_idx
            );
            picture.demote();
        }

        if picture.is_reference {
            while self.frames.len() >= self.max_frames {
                if !self.bump(POC_MAX) {
                    warn!(
                        "H264: DPB 已满且无待输出图像, capacity={}, poc={}",
                        self.max_frames, picture.poc
                    );
                    return Err(PicbufError::DpbFull {
                        capacity: self.max_frames,
                        stored: self.frames.len(),
                    });
                }
            }
            trace!(
                "H264: 参考图像入库, poc={}, frame_idx={}, long_term={}",
                picture.poc, picture.frame_idx, picture.is_long_term
            );
            self.frames.push(picture);
        } else {
            while self.bump(picture.poc) {}
            self.emit(picture);
        }
        Ok(())
    }

    /// 输出 POC 最小且小于 `poc_ceiling` 的待输出图像
    ///
    /// 返回 false 表示没有满足条件的图像, 此时无副作用.
    pub fn bump(&mut self, poc_ceiling: i32) -> bool {
        // min_by_key 在并列时返回第一个, 即最早入库者
        let Some((idx, poc)) = self
            .frames
            .iter()
            .enumerate()
            .filter(|(_, pic)| pic.output_needed)
            .min_by_key(|(_, pic)| pic.poc)
            .map(|(idx, pic)| (idx, pic.poc))
        else {
            return false;
        };
        if poc >= poc_ceiling {
            return false;
        }

        self.frames[idx].output_needed = false;
        if self.frames[idx].is_reference {
            let copy = self.frames[idx].clone();
            self.emit(copy);
        } else {
            let picture = self.frames.remove(idx);
            self.emit(picture);
        }
        true
    }

    /// 清空 DPB
    ///
    /// `output` 为 true 时先按 POC 顺序输出全部待输出图像,
    /// 否则直接丢弃, 不调用输出回调.
    pub fn flush(&mut self, output: bool) {
        if output {
            while self.bump(POC_MAX) {}
        }
        debug!(
            "H264: 清空 DPB, output={}, dropped={}",
            output,
            self.frames.len()
        );
        self.frames.clear();
    }

    fn emit(&mut self, mut picture: Picture) {
        picture.output_needed = false;
        self.output_count += 1;
        trace!("H264: 输出图像, poc={}", picture.poc);
        (self.output)(picture);
    }

    // ------------------------------------------------------------
    // 参考帧标记
    // ------------------------------------------------------------

    /// 将 `idx` 处的图像标记为不参考, 已输出则立即移除
    fn unmark_at(&mut self, idx: usize) {
        self.frames[idx].demote();
        if self.frames[idx].is_finished() {
            self.frames.remove(idx);
        }
    }

    fn position_short_term(&self, pic_num: i32) -> Option<usize> {
        let ctx = self.frame_num_ctx;
        self.frames
            .iter()
            .position(|pic| pic.is_short_term_reference() && ctx.pic_num(pic.frame_idx) == pic_num)
    }

    fn position_long_term(&self, long_term_frame_idx: u32) -> Option<usize> {
        self.frames
            .iter()
            .position(|pic| pic.is_long_term_reference() && pic.frame_idx == long_term_frame_idx)
    }

    /// 滑动窗口: 将帧号最旧的短期参考帧标记为不参考
    ///
    /// 返回 false 表示没有短期参考帧.
    pub fn mark_sliding(&mut self) -> bool {
        let ctx = self.frame_num_ctx;
        let Some(idx) = self
            .frames
            .iter()
            .enumerate()
            .filter(|(_, pic)| pic.is_short_term_reference())
            .min_by_key(|(_, pic)| ctx.pic_num(pic.frame_idx))
            .map(|(idx, _)| idx)
        else {
            return false;
        };
        trace!(
            "H264: 滑动窗口移出短期参考帧, frame_num={}, poc={}",
            self.frames[idx].frame_idx, self.frames[idx].poc
        );
        self.unmark_at(idx);
        true
    }

    /// 将 picNum 命中的短期参考帧转为长期参考帧
    ///
    /// 已占用该长期索引的其他长期帧先被标记为不参考.
    pub fn mark_long_term(&mut self, pic_num: i32, long_term_idx: u32) -> PicbufResult<()> {
        if self.position_short_term(pic_num).is_none() {
            return Err(PicbufError::ReferenceNotFound {
                kind: ReferenceKind::ShortTerm,
                pic_num,
            });
        }
        if let Some(old) = self.position_long_term(long_term_idx) {
            self.unmark_at(old);
        }
        let Some(idx) = self.position_short_term(pic_num) else {
            return Err(PicbufError::ReferenceNotFound {
                kind: ReferenceKind::ShortTerm,
                pic_num,
            });
        };
        if self.long_term_idx_allowed(long_term_idx) {
            self.frames[idx].set_long_term(long_term_idx);
        } else {
            warn!(
                "H264: 长期帧索引超出上限, 改为不参考, idx={}, max={:?}",
                long_term_idx, self.max_longterm_frame_idx
            );
            self.unmark_at(idx);
        }
        Ok(())
    }

    /// 将 picNum 命中的短期参考帧标记为不参考
    pub fn mark_short_term_unused(&mut self, pic_num: i32) -> PicbufResult<()> {
        let idx = self
            .position_short_term(pic_num)
            .ok_or(PicbufError::ReferenceNotFound {
                kind: ReferenceKind::ShortTerm,
                pic_num,
            })?;
        self.unmark_at(idx);
        Ok(())
    }

    /// 将 LongTermPicNum 命中的长期参考帧标记为不参考
    pub fn mark_long_term_unused(&mut self, long_term_pic_num: u32) -> PicbufResult<()> {
        let idx = self
            .position_long_term(long_term_pic_num)
            .ok_or(PicbufError::ReferenceNotFound {
                kind: ReferenceKind::LongTerm,
                pic_num: long_term_pic_num as i32,
            })?;
        self.unmark_at(idx);
        Ok(())
    }

    /// 所有参考帧标记为不参考, 已输出的立即移除
    pub fn mark_all_unused(&mut self) {
        for pic in self.frames.iter_mut() {
            pic.demote();
        }
        self.frames.retain(|pic| !pic.is_finished());
    }

    /// 释放占用指定长期索引的长期帧 (MMCO6 前置步骤)
    pub fn release_long_term_idx(&mut self, long_term_frame_idx: u32) {
        if let Some(idx) = self.position_long_term(long_term_frame_idx) {
            self.unmark_at(idx);
        }
    }

    // ------------------------------------------------------------
    // 运行时属性
    // ------------------------------------------------------------

    /// 修改容量, 超出部分通过 bump 腾出
    pub fn set_max_frames(&mut self, max_frames: usize) -> PicbufResult<()> {
        self.max_frames = max_frames.min(MAX_REFERENCE_FRAMES);
        while self.frames.len() > self.max_frames {
            if !self.bump(POC_MAX) {
                return Err(PicbufError::DpbFull {
                    capacity: self.max_frames,
                    stored: self.frames.len(),
                });
            }
        }
        Ok(())
    }

    /// 修改长期帧索引上限, 超出上限的长期帧被标记为不参考
    pub fn set_max_longterm_frame_idx(&mut self, max_idx: Option<u32>) {
        self.max_longterm_frame_idx = max_idx;
        for pic in self.frames.iter_mut() {
            if pic.is_long_term_reference() && max_idx.is_none_or(|max| pic.frame_idx > max) {
                pic.demote();
            }
        }
        self.frames.retain(|pic| !pic.is_finished());
    }

    /// 填充交给解码后端的 16 槽参考帧列表, 空槽为 `ReferenceFrame::INVALID`
    pub fn fill_reference_list(&self) -> [ReferenceFrame; MAX_REFERENCE_FRAMES] {
        let mut out = [ReferenceFrame::INVALID; MAX_REFERENCE_FRAMES];
        for (slot, pic) in out.iter_mut().zip(self.frames.iter()) {
            *slot = ReferenceFrame::from(pic);
        }
        out
    }
}
