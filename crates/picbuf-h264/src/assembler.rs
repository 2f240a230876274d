//! 帧组装: 把连续的 slice 归并为一幅逻辑图像.
//!
//! 新图像的判定依据 (首个 VCL NAL 检测):
//! frame_num、pps_id、场标志、nal_ref_idc 是否为 0、IDR 标志、idr_pic_id,
//! 以及 POC type 0 下的 pic_order_cnt_lsb / delta_pic_order_cnt_bottom.
//!
//! 首个 IDR 之前的 slice 一律丢弃 (等待关键帧).

use log::debug;

use crate::syntax::{Slice, SliceHeader, Sps};

/// 正在组装的图像
#[derive(Debug, Clone)]
pub struct PictureInProgress {
    /// 按到达顺序排列的 slice, 至少一个
    pub slices: Vec<Slice>,
}

impl PictureInProgress {
    fn new(first: Slice) -> Self {
        Self {
            slices: vec![first],
        }
    }

    /// 首个 slice 的头部, 代表整幅图像
    pub fn header(&self) -> &SliceHeader {
        &self.slices[0].header
    }

    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }
}

/// 帧组装器
#[derive(Debug, Default)]
pub struct FrameAssembler {
    current: Option<PictureInProgress>,
    got_idr: bool,
    /// 等待关键帧期间丢弃的 slice 数
    pre_idr_drops: u64,
    /// 丢弃的冗余 slice 数
    redundant_drops: u64,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 送入一个 slice
    ///
    /// 若该 slice 开始了一幅新图像, 返回此前组装完成的图像.
    pub fn add_slice(&mut self, slice: Slice, sps: &Sps) -> Option<PictureInProgress> {
        let header = &slice.header;
        if header.redundant_pic_cnt > 0 {
            self.redundant_drops += 1;
            debug!(
                "H264: 跳过冗余 slice, redundant_pic_cnt={}, frame_num={}",
                header.redundant_pic_cnt, header.frame_num
            );
            return None;
        }
        if self.skip_before_idr(header) {
            return None;
        }

        let starts_new = match self.current.as_ref() {
            Some(current) => is_new_picture(current.header(), &slice.header, sps),
            None => true,
        };
        if !starts_new {
            if let Some(current) = self.current.as_mut() {
                current.slices.push(slice);
            }
            return None;
        }
        self.current.replace(PictureInProgress::new(slice))
    }

    /// 等待关键帧: 首个 IDR 之前的 slice 返回 true, 计入丢弃数
    pub fn skip_before_idr(&mut self, header: &SliceHeader) -> bool {
        if self.got_idr {
            return false;
        }
        if !header.is_idr {
            self.pre_idr_drops += 1;
            debug!("H264: 等待 IDR, 丢弃 slice, frame_num={}", header.frame_num);
            return true;
        }
        self.got_idr = true;
        false
    }

    /// 结束当前图像 (流结束或外部边界信号)
    pub fn finalize_picture(&mut self) -> Option<PictureInProgress> {
        self.current.take()
    }

    /// 是否已收到过 IDR
    pub fn got_idr(&self) -> bool {
        self.got_idr
    }

    pub fn pre_idr_drops(&self) -> u64 {
        self.pre_idr_drops
    }

    pub fn redundant_drops(&self) -> u64 {
        self.redundant_drops
    }

    /// 丢弃进行中的图像并重新等待 IDR
    pub fn reset(&mut self) {
        self.current = None;
        self.got_idr = false;
    }
}

/// `next` 是否开始了一幅与 `prev` 不同的图像
pub fn is_new_picture(prev: &SliceHeader, next: &SliceHeader, sps: &Sps) -> bool {
    if prev.frame_num != next.frame_num
        || prev.pps_id != next.pps_id
        || prev.field_pic != next.field_pic
        || prev.bottom_field != next.bottom_field
        || (prev.nal_ref_idc == 0) != (next.nal_ref_idc == 0)
        || prev.is_idr != next.is_idr
    {
        return true;
    }
    if sps.poc_type == 0
        && (prev.pic_order_cnt_lsb != next.pic_order_cnt_lsb
            || prev.delta_poc_bottom != next.delta_poc_bottom)
    {
        return true;
    }
    prev.is_idr && next.is_idr && prev.idr_pic_id != next.idr_pic_id
}
