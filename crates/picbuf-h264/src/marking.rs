//! 参考帧标记 (dec_ref_pic_marking).
//!
//! 分两个阶段:
//! - `prepare_idr`: IDR 图像计算 POC 之前, 重置计数器并清空 DPB
//! - `mark_reference`: 参考图像解码完成、入库之前, 执行 IDR 长期标记、
//!   MMCO 序列或滑动窗口
//!
//! 标记操作找不到目标图像时记为软错误: 记录日志与计数, 继续执行后续操作.

use log::{debug, warn};
use picbuf_core::PicbufResult;

use crate::dpb::Dpb;
use crate::picture::Picture;
use crate::poc::PocState;
use crate::syntax::{DecRefPicMarking, MmcoOp};

/// 一次标记过程的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkingReport {
    /// 未命中目标图像的标记操作次数
    pub lookup_misses: u32,
    /// 是否执行了 MMCO5
    pub memory_reset: bool,
    /// 是否执行了滑动窗口
    pub sliding_window: bool,
}

/// IDR 预处理
///
/// 按 no_output_of_prior_pics_flag 决定是否输出既有图像, 然后清空 DPB;
/// long_term_reference_flag 决定长期帧索引上限.
pub fn prepare_idr(dpb: &mut Dpb, poc_state: &mut PocState, marking: &DecRefPicMarking) {
    poc_state.reset();
    dpb.flush(!marking.no_output_of_prior_pics);
    dpb.set_max_longterm_frame_idx(if marking.long_term_reference_flag {
        Some(0)
    } else {
        None
    });
}

/// 对刚解码完成的参考图像执行标记, 结果写入 `dpb` 与 `picture`
pub fn mark_reference(
    dpb: &mut Dpb,
    poc_state: &mut PocState,
    picture: &mut Picture,
    marking: &DecRefPicMarking,
) -> PicbufResult<MarkingReport> {
    let mut report = MarkingReport::default();
    if !picture.is_reference {
        return Ok(report);
    }

    if picture.is_idr {
        if marking.long_term_reference_flag {
            picture.set_long_term(0);
        }
        return Ok(report);
    }

    if marking.adaptive {
        for op in &marking.ops {
            apply_mmco(dpb, poc_state, picture, op, &mut report)?;
        }
        return Ok(report);
    }

    let max_frames = dpb.max_frames();
    if max_frames > 0 && dpb.num_reference_frames() >= max_frames {
        report.sliding_window = dpb.mark_sliding();
    }
    Ok(report)
}

fn apply_mmco(
    dpb: &mut Dpb,
    poc_state: &mut PocState,
    picture: &mut Picture,
    op: &MmcoOp,
    report: &mut MarkingReport,
) -> PicbufResult<()> {
    let curr_pic_num = dpb.frame_num_context().curr_pic_num();
    debug!("H264: MMCO{} 应用于 frame_num={}", op.opcode(), picture.frame_num);
    match *op {
        MmcoOp::ForgetShort {
            difference_of_pic_nums_minus1,
        } => {
            let pic_num = curr_pic_num - (difference_of_pic_nums_minus1 as i32 + 1);
            soften(dpb.mark_short_term_unused(pic_num), report)
        }
        MmcoOp::ForgetLong { long_term_pic_num } => {
            soften(dpb.mark_long_term_unused(long_term_pic_num), report)
        }
        MmcoOp::ConvertShortToLong {
            difference_of_pic_nums_minus1,
            long_term_frame_idx,
        } => {
            let pic_num = curr_pic_num - (difference_of_pic_nums_minus1 as i32 + 1);
            soften(dpb.mark_long_term(pic_num, long_term_frame_idx), report)
        }
        MmcoOp::TrimLong {
            max_long_term_frame_idx_plus1,
        } => {
            dpb.set_max_longterm_frame_idx(max_long_term_frame_idx_plus1.checked_sub(1));
            Ok(())
        }
        MmcoOp::ClearAll => {
            dpb.mark_all_unused();
            dpb.set_max_longterm_frame_idx(None);
            // MMCO5 之后的图像 POC 从 0 重新计, 先前图像必须全部先输出
            dpb.flush(true);
            poc_state.reset();
            picture.poc = 0;
            picture.frame_num = 0;
            if !picture.is_long_term {
                picture.frame_idx = 0;
            }
            report.memory_reset = true;
            Ok(())
        }
        MmcoOp::MarkCurrentLong {
            long_term_frame_idx,
        } => {
            if dpb.long_term_idx_allowed(long_term_frame_idx) {
                dpb.release_long_term_idx(long_term_frame_idx);
                picture.set_long_term(long_term_frame_idx);
            } else {
                warn!(
                    "H264: MMCO6 长期帧索引超出上限, 保持短期参考, idx={}, max={:?}",
                    long_term_frame_idx,
                    dpb.max_longterm_frame_idx()
                );
            }
            Ok(())
        }
    }
}

/// 软错误转为计数, 其余错误原样返回
fn soften(result: PicbufResult<()>, report: &mut MarkingReport) -> PicbufResult<()> {
    match result {
        Err(err) if err.is_soft() => {
            warn!("H264: 标记操作未命中, {}", err);
            report.lookup_misses += 1;
            Ok(())
        }
        other => other,
    }
}
