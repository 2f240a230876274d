//! 解码会话: 串联帧组装、POC 计算、外部解码、参考帧标记与 DPB.
//!
//! 会话持有所有跨图像状态 (参数集、POC 计数器、DPB 配置).
//! 致命错误 (DPB 满、不支持的码流特性、后端失败) 只报告一次,
//! 之后的输入一律返回 `SessionTerminated`, 直到调用 `reset`.

use std::collections::HashMap;

use log::{debug, error, warn};
use picbuf_core::{PicbufError, PicbufResult};

use crate::assembler::{FrameAssembler, PictureInProgress};
use crate::backend::{DecodeBackend, PictureInfo};
use crate::config::{self, DpbConfig};
use crate::dpb::{Dpb, FrameNumContext, MAX_REFERENCE_FRAMES, OutputCallback};
use crate::marking;
use crate::picture::Picture;
use crate::poc::{self, PocState};
use crate::syntax::{Pps, Slice, Sps};

/// 支持的 profile_idc: Baseline / Main / Extended / High
const SUPPORTED_PROFILES: [u8; 4] = [66, 77, 88, 100];

/// 会话统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// 提交解码的图像数
    pub pictures_decoded: u64,
    /// 标记操作未命中次数 (可能是损坏码流)
    pub marking_misses: u64,
    /// 执行 MMCO5 的次数
    pub memory_resets: u64,
    /// 因 PPS/SPS 缺失被丢弃的 slice 数
    pub orphan_slices: u64,
}

/// 解码会话
pub struct Session<B: DecodeBackend> {
    config: DpbConfig,
    sps_map: HashMap<u32, Sps>,
    pps_map: HashMap<u32, Pps>,
    /// 激活时的 SPS 副本, 同 id 的新内容要等到下一个 IDR 才生效
    active_sps: Option<Sps>,
    poc_state: PocState,
    assembler: FrameAssembler,
    dpb: Dpb,
    backend: B,
    decode_order: u64,
    stats: SessionStats,
    /// 致命错误描述, Some 表示会话已终止
    terminated: Option<String>,
}

impl<B: DecodeBackend> Session<B> {
    /// 创建会话, `output` 按 POC 顺序接收输出图像
    pub fn new(config: DpbConfig, backend: B, output: OutputCallback) -> PicbufResult<Self> {
        config.validate()?;
        let mut dpb = Dpb::new(config.max_ref_frames.max(1) as usize, output);
        dpb.set_max_longterm_frame_idx(config.long_term_ceiling());
        Ok(Self {
            config,
            sps_map: HashMap::new(),
            pps_map: HashMap::new(),
            active_sps: None,
            poc_state: PocState::default(),
            assembler: FrameAssembler::new(),
            dpb,
            backend,
            decode_order: 0,
            stats: SessionStats::default(),
            terminated: None,
        })
    }

    pub fn config(&self) -> DpbConfig {
        self.config
    }

    pub fn dpb(&self) -> &Dpb {
        &self.dpb
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn poc_state(&self) -> PocState {
        self.poc_state
    }

    pub fn assembler(&self) -> &FrameAssembler {
        &self.assembler
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn active_sps(&self) -> Option<&Sps> {
        self.active_sps.as_ref()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.is_some()
    }

    // ============================================================
    // 参数集
    // ============================================================

    /// 处理 SPS, 不支持的特性是致命错误
    pub fn handle_sps(&mut self, sps: Sps) -> PicbufResult<()> {
        self.ensure_running()?;
        let result = Self::validate_sps_support(&sps);
        self.check(result)?;
        debug!(
            "H264: SPS id={} {}x{} profile={} num_ref_frames={} poc_type={}",
            sps.sps_id, sps.width, sps.height, sps.profile_idc, sps.max_num_ref_frames, sps.poc_type
        );
        let sps_id = sps.sps_id;
        if self
            .active_sps
            .as_ref()
            .is_some_and(|active| active.sps_id == sps_id && *active != sps)
        {
            debug!("H264: 活动 SPS 内容变化, 等待 IDR 重新激活, sps_id={}", sps_id);
        }
        self.sps_map.insert(sps_id, sps);
        Ok(())
    }

    /// 处理 PPS
    pub fn handle_pps(&mut self, pps: Pps) -> PicbufResult<()> {
        self.ensure_running()?;
        debug!("H264: PPS id={} sps={}", pps.pps_id, pps.sps_id);
        self.pps_map.insert(pps.pps_id, pps);
        Ok(())
    }

    fn validate_sps_support(sps: &Sps) -> PicbufResult<()> {
        if sps.poc_type != 0 {
            return Err(PicbufError::Unsupported(format!(
                "H264: 暂不支持 pic_order_cnt_type={}, sps_id={}",
                sps.poc_type, sps.sps_id
            )));
        }
        if !sps.frame_mbs_only {
            return Err(PicbufError::Unsupported(
                "H264: 暂不支持场编码(frame_mbs_only_flag=0)".into(),
            ));
        }
        if !SUPPORTED_PROFILES.contains(&sps.profile_idc) {
            return Err(PicbufError::Unsupported(format!(
                "H264: 暂不支持 profile_idc={}",
                sps.profile_idc
            )));
        }
        Ok(())
    }

    fn activate_sps(&mut self, sps: Sps) -> PicbufResult<()> {
        if self.active_sps.as_ref().is_some_and(|active| *active != sps) {
            // 序列切换 (id 或内容变化): 先输出旧序列的全部图像
            debug!("H264: 切换 SPS, sps_id={}", sps.sps_id);
            self.dpb.flush(true);
            self.poc_state.reset();
        }
        self.active_sps = Some(sps);
        self.dpb.set_max_frames(self.effective_max_frames())
    }

    /// 实际 DPB 容量: 配置上限与 SPS max_num_ref_frames 取较小值, 至少为 1
    fn effective_max_frames(&self) -> usize {
        let from_sps = self
            .active_sps()
            .map(|sps| sps.max_num_ref_frames.clamp(1, MAX_REFERENCE_FRAMES as u32))
            .unwrap_or(MAX_REFERENCE_FRAMES as u32);
        self.config.max_ref_frames.min(from_sps).max(1) as usize
    }

    // ============================================================
    // 运行时属性
    // ============================================================

    /// 修改参考帧容量上限 (0-16)
    pub fn set_max_ref_frames(&mut self, max_ref_frames: u32) -> PicbufResult<()> {
        config::validate_max_ref_frames(max_ref_frames)?;
        self.config.max_ref_frames = max_ref_frames;
        let result = self.dpb.set_max_frames(self.effective_max_frames());
        self.check(result)
    }

    /// 修改长期帧索引上限 (-1 表示不允许长期参考帧)
    pub fn set_max_long_term_frame_idx(&mut self, max_idx: i32) -> PicbufResult<()> {
        config::validate_max_long_term_frame_idx(max_idx)?;
        self.config.max_long_term_frame_idx = max_idx;
        self.dpb
            .set_max_longterm_frame_idx(config::long_term_ceiling(max_idx));
        Ok(())
    }

    // ============================================================
    // 解码流程
    // ============================================================

    /// 送入一个 slice
    ///
    /// slice 开始新图像时, 此前组装完成的图像被提交解码并入库.
    pub fn decode_slice(&mut self, slice: Slice) -> PicbufResult<()> {
        self.ensure_running()?;
        let result = self.decode_slice_inner(slice);
        self.check(result)
    }

    fn decode_slice_inner(&mut self, slice: Slice) -> PicbufResult<()> {
        let header = &slice.header;
        if self.assembler.skip_before_idr(header) {
            return Ok(());
        }
        let Some(sps_id) = self.pps_map.get(&header.pps_id).map(|pps| pps.sps_id) else {
            self.stats.orphan_slices += 1;
            return Err(PicbufError::InvalidData(format!(
                "H264: 未找到 PPS id={}",
                header.pps_id
            )));
        };
        let Some(latest) = self.sps_map.get(&sps_id) else {
            self.stats.orphan_slices += 1;
            return Err(PicbufError::InvalidData(format!(
                "H264: 未找到 SPS id={}",
                sps_id
            )));
        };

        let same_id = self
            .active_sps
            .as_ref()
            .is_some_and(|active| active.sps_id == sps_id);
        let content_changed = self
            .active_sps
            .as_ref()
            .is_some_and(|active| active != latest);
        if !same_id && !header.is_idr {
            self.stats.orphan_slices += 1;
            return Err(PicbufError::InvalidData(format!(
                "H264: 非 IDR slice 引用了未激活的 SPS id={}",
                sps_id
            )));
        }
        // 同 id 内容变化时, 非 IDR slice 继续沿用已激活的 SPS
        if !same_id || (content_changed && header.is_idr) {
            let latest = latest.clone();
            if let Some(pending) = self.assembler.finalize_picture() {
                self.process_picture(pending)?;
            }
            self.activate_sps(latest)?;
        }

        let Some(sps) = self.active_sps.as_ref() else {
            return Ok(());
        };
        match self.assembler.add_slice(slice, sps) {
            Some(finished) => self.process_picture(finished),
            None => Ok(()),
        }
    }

    /// 流结束: 提交最后一幅图像并按 POC 顺序输出全部待输出图像
    pub fn end_of_stream(&mut self) -> PicbufResult<()> {
        self.ensure_running()?;
        let result = match self.assembler.finalize_picture() {
            Some(pending) => self.process_picture(pending),
            None => Ok(()),
        };
        self.check(result)?;
        self.dpb.flush(true);
        debug!(
            "H264: 流结束, 已解码={}, 已输出={}",
            self.stats.pictures_decoded,
            self.dpb.output_count()
        );
        Ok(())
    }

    /// 丢弃全部状态 (不输出), 会话恢复可用
    pub fn reset(&mut self) {
        self.dpb.flush(false);
        self.dpb
            .set_max_longterm_frame_idx(self.config.long_term_ceiling());
        self.assembler.reset();
        self.poc_state.reset();
        self.active_sps = None;
        self.decode_order = 0;
        self.terminated = None;
    }

    fn process_picture(&mut self, pending: PictureInProgress) -> PicbufResult<()> {
        let header = pending.header().clone();
        let sps = self
            .active_sps()
            .cloned()
            .ok_or_else(|| PicbufError::InvalidData("H264: 没有活动的 SPS".into()))?;

        if header.is_idr {
            marking::prepare_idr(
                &mut self.dpb,
                &mut self.poc_state,
                &header.dec_ref_pic_marking,
            );
        }
        let poc = poc::compute_poc(&mut self.poc_state, &sps, &header)?;
        self.dpb
            .set_frame_num_context(FrameNumContext::new(header.frame_num, sps.max_frame_num()));

        let info = PictureInfo {
            frame_num: header.frame_num,
            poc,
            is_reference: header.is_reference(),
            is_idr: header.is_idr,
            num_ref_frames: sps.max_num_ref_frames,
            log2_max_frame_num: sps.log2_max_frame_num,
            poc_type: sps.poc_type,
            log2_max_poc_lsb: sps.log2_max_poc_lsb,
            slice_count: pending.slice_count(),
            reference_frames: self.dpb.fill_reference_list(),
        };
        let surface = self.backend.decode(&info, &pending.slices)?;
        self.stats.pictures_decoded += 1;

        let mut picture =
            Picture::new(poc, header.frame_num, header.is_reference()).with_surface(surface);
        picture.is_idr = header.is_idr;
        picture.picture_type = header.slice_type.into();
        picture.decode_order = self.decode_order;
        self.decode_order += 1;

        let report = marking::mark_reference(
            &mut self.dpb,
            &mut self.poc_state,
            &mut picture,
            &header.dec_ref_pic_marking,
        )?;
        self.stats.marking_misses += u64::from(report.lookup_misses);
        if report.memory_reset {
            self.stats.memory_resets += 1;
        }
        if report.lookup_misses > 0 {
            warn!(
                "H264: 图像标记存在未命中操作, frame_num={}, misses={}",
                header.frame_num, report.lookup_misses
            );
        }
        self.dpb.add(picture)
    }

    fn ensure_running(&self) -> PicbufResult<()> {
        match &self.terminated {
            Some(reason) => Err(PicbufError::SessionTerminated(reason.clone())),
            None => Ok(()),
        }
    }

    /// 致命错误锁存会话
    fn check<T>(&mut self, result: PicbufResult<T>) -> PicbufResult<T> {
        if let Err(err) = &result
            && err.is_fatal()
            && self.terminated.is_none()
        {
            error!("H264: 会话终止, {}", err);
            self.terminated = Some(err.to_string());
        }
        result
    }
}
