//! 轨迹文件格式.
//!
//! 每行一个 JSON 事件, 由外部码流解析器导出:
//!
//! ```text
//! {"type":"sps","sps_id":0,"profile_idc":100,"max_num_ref_frames":4,"log2_max_frame_num":4,"log2_max_poc_lsb":6,"width":1920,"height":1080}
//! {"type":"pps","pps_id":0,"sps_id":0}
//! {"type":"slice","frame_num":0,"nal_ref_idc":3,"idr":true,"slice_type":7,"poc_lsb":0}
//! {"type":"slice","frame_num":1,"nal_ref_idc":2,"slice_type":5,"poc_lsb":8,"mmco":[{"op":"forget_short","difference_of_pic_nums_minus1":0}]}
//! {"type":"eos"}
//! ```
//!
//! 空行与 `#` 开头的行被忽略.

use std::io::BufRead;

use anyhow::{Context, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use picbuf_h264::{DecRefPicMarking, MmcoOp, Pps, Slice, SliceHeader, SliceType, Sps};

/// 轨迹事件
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    Sps(SpsRecord),
    Pps(PpsRecord),
    Slice(SliceRecord),
    /// 运行时修改参考帧容量
    MaxRefFrames { value: u32 },
    /// 运行时修改长期帧索引上限
    MaxLongTermFrameIdx { value: i32 },
    Eos,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpsRecord {
    pub sps_id: u32,
    pub profile_idc: u8,
    pub max_num_ref_frames: u32,
    pub log2_max_frame_num: u32,
    #[serde(default)]
    pub poc_type: u32,
    pub log2_max_poc_lsb: u32,
    #[serde(default = "default_true")]
    pub frame_mbs_only: bool,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PpsRecord {
    pub pps_id: u32,
    pub sps_id: u32,
    #[serde(default)]
    pub pic_order_present: bool,
    #[serde(default)]
    pub redundant_pic_cnt_present: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SliceRecord {
    #[serde(default)]
    pub first_mb: u32,
    pub slice_type: u32,
    #[serde(default)]
    pub pps_id: u32,
    pub frame_num: u32,
    pub nal_ref_idc: u8,
    #[serde(default)]
    pub idr: bool,
    #[serde(default)]
    pub idr_pic_id: u32,
    pub poc_lsb: u32,
    #[serde(default)]
    pub delta_poc_bottom: i32,
    #[serde(default)]
    pub redundant_pic_cnt: u32,
    #[serde(default)]
    pub no_output_of_prior_pics: bool,
    #[serde(default)]
    pub long_term_reference: bool,
    /// 存在时启用 adaptive_ref_pic_marking_mode
    #[serde(default)]
    pub mmco: Option<Vec<MmcoRecord>>,
    /// NAL 数据长度, 内容以零填充
    #[serde(default)]
    pub size: usize,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MmcoRecord {
    ForgetShort {
        difference_of_pic_nums_minus1: u32,
    },
    ForgetLong {
        long_term_pic_num: u32,
    },
    ConvertShortToLong {
        difference_of_pic_nums_minus1: u32,
        long_term_frame_idx: u32,
    },
    TrimLong {
        max_long_term_frame_idx_plus1: u32,
    },
    ClearAll,
    MarkCurrentLong {
        long_term_frame_idx: u32,
    },
}

fn default_true() -> bool {
    true
}

impl From<SpsRecord> for Sps {
    fn from(r: SpsRecord) -> Self {
        Self {
            sps_id: r.sps_id,
            profile_idc: r.profile_idc,
            max_num_ref_frames: r.max_num_ref_frames,
            log2_max_frame_num: r.log2_max_frame_num,
            poc_type: r.poc_type,
            log2_max_poc_lsb: r.log2_max_poc_lsb,
            frame_mbs_only: r.frame_mbs_only,
            width: r.width,
            height: r.height,
        }
    }
}

impl From<PpsRecord> for Pps {
    fn from(r: PpsRecord) -> Self {
        Self {
            pps_id: r.pps_id,
            sps_id: r.sps_id,
            pic_order_present: r.pic_order_present,
            redundant_pic_cnt_present: r.redundant_pic_cnt_present,
        }
    }
}

impl From<MmcoRecord> for MmcoOp {
    fn from(r: MmcoRecord) -> Self {
        match r {
            MmcoRecord::ForgetShort {
                difference_of_pic_nums_minus1,
            } => Self::ForgetShort {
                difference_of_pic_nums_minus1,
            },
            MmcoRecord::ForgetLong { long_term_pic_num } => Self::ForgetLong { long_term_pic_num },
            MmcoRecord::ConvertShortToLong {
                difference_of_pic_nums_minus1,
                long_term_frame_idx,
            } => Self::ConvertShortToLong {
                difference_of_pic_nums_minus1,
                long_term_frame_idx,
            },
            MmcoRecord::TrimLong {
                max_long_term_frame_idx_plus1,
            } => Self::TrimLong {
                max_long_term_frame_idx_plus1,
            },
            MmcoRecord::ClearAll => Self::ClearAll,
            MmcoRecord::MarkCurrentLong {
                long_term_frame_idx,
            } => Self::MarkCurrentLong {
                long_term_frame_idx,
            },
        }
    }
}

impl From<SliceRecord> for Slice {
    fn from(r: SliceRecord) -> Self {
        let dec_ref_pic_marking = DecRefPicMarking {
            no_output_of_prior_pics: r.no_output_of_prior_pics,
            long_term_reference_flag: r.long_term_reference,
            adaptive: r.mmco.is_some(),
            ops: r
                .mmco
                .unwrap_or_default()
                .into_iter()
                .map(MmcoOp::from)
                .collect(),
        };
        let header = SliceHeader {
            first_mb: r.first_mb,
            slice_type: SliceType::from_raw(r.slice_type),
            pps_id: r.pps_id,
            frame_num: r.frame_num,
            field_pic: false,
            bottom_field: false,
            nal_ref_idc: r.nal_ref_idc,
            is_idr: r.idr,
            idr_pic_id: r.idr_pic_id,
            pic_order_cnt_lsb: r.poc_lsb,
            delta_poc_bottom: r.delta_poc_bottom,
            redundant_pic_cnt: r.redundant_pic_cnt,
            dec_ref_pic_marking,
        };
        Slice::new(header, Bytes::from(vec![0u8; r.size]))
    }
}

/// 读取全部事件, 错误信息带行号
pub fn read_events(reader: impl BufRead) -> Result<Vec<TraceEvent>> {
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("读取第 {} 行失败", idx + 1))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: TraceEvent = serde_json::from_str(line)
            .with_context(|| format!("第 {} 行不是合法的轨迹事件", idx + 1))?;
        events.push(event);
    }
    Ok(events)
}
