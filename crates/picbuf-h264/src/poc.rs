//! 图像顺序计数 (POC) 计算.
//!
//! 仅支持 pic_order_cnt_type = 0 (显式 LSB 信令).
//! type 1/2 返回 `PicbufError::Unsupported`, 而不是静默给出 0.

use log::trace;
use picbuf_core::{PicbufError, PicbufResult};

use crate::syntax::{SliceHeader, Sps};

/// POC type 0 的跨图像计数器
///
/// 由会话持有并显式传入, 每个 IDR 前归零.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PocState {
    /// PicOrderCntMsb
    pub poc_msb: i32,
    /// 上一幅图像的 pic_order_cnt_lsb
    pub prev_poc_lsb: i32,
}

impl PocState {
    /// 归零 (IDR 与 MMCO5 之后)
    pub fn reset(&mut self) {
        self.poc_msb = 0;
        self.prev_poc_lsb = 0;
    }
}

/// 根据 slice header 计算当前图像的 POC
///
/// IDR 图像先归零计数器再计算.
pub fn compute_poc(state: &mut PocState, sps: &Sps, header: &SliceHeader) -> PicbufResult<i32> {
    if sps.poc_type != 0 {
        return Err(PicbufError::Unsupported(format!(
            "H264: 暂不支持 pic_order_cnt_type={}, 仅支持 type 0",
            sps.poc_type
        )));
    }
    if header.is_idr {
        state.reset();
    }
    let poc = poc_from_lsb(state, sps.log2_max_poc_lsb, header.pic_order_cnt_lsb);
    trace!(
        "H264: POC 计算, frame_num={}, lsb={}, msb={}, poc={}",
        header.frame_num, header.pic_order_cnt_lsb, state.poc_msb, poc
    );
    Ok(poc)
}

/// type 0 核心算法: 用 LSB 的跳变推断 MSB 的回绕方向
pub fn poc_from_lsb(state: &mut PocState, log2_max_poc_lsb: u32, pic_order_cnt_lsb: u32) -> i32 {
    let max_poc_lsb = 1i32 << log2_max_poc_lsb.min(30);
    let poc_lsb = (pic_order_cnt_lsb as i32) & (max_poc_lsb - 1);
    let prev_lsb = state.prev_poc_lsb;

    let mut poc_msb = state.poc_msb;
    if poc_lsb < prev_lsb && (prev_lsb - poc_lsb) >= (max_poc_lsb / 2) {
        poc_msb += max_poc_lsb;
    } else if poc_lsb > prev_lsb && (poc_lsb - prev_lsb) > (max_poc_lsb / 2) {
        poc_msb -= max_poc_lsb;
    }

    state.poc_msb = poc_msb;
    state.prev_poc_lsb = poc_lsb;
    poc_msb + poc_lsb
}
