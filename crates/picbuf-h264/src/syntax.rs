//! 参考帧管理所需的 H.264 语法元素.
//!
//! 这些结构由外部码流解析器填充, 本 crate 只消费其中与
//! 图像边界判定、POC 计算和参考帧标记相关的字段.

use bytes::Bytes;

// ============================================================
// 参数集
// ============================================================

/// SPS 中与参考帧管理相关的字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    /// seq_parameter_set_id
    pub sps_id: u32,
    /// profile_idc
    pub profile_idc: u8,
    /// max_num_ref_frames
    pub max_num_ref_frames: u32,
    /// log2_max_frame_num_minus4 + 4
    pub log2_max_frame_num: u32,
    /// pic_order_cnt_type
    pub poc_type: u32,
    /// log2_max_pic_order_cnt_lsb_minus4 + 4
    pub log2_max_poc_lsb: u32,
    /// frame_mbs_only_flag
    pub frame_mbs_only: bool,
    /// 图像宽度 (像素)
    pub width: u32,
    /// 图像高度 (像素)
    pub height: u32,
}

impl Sps {
    /// MaxFrameNum = 2^log2_max_frame_num
    pub fn max_frame_num(&self) -> u32 {
        1u32 << self.log2_max_frame_num.min(16)
    }

    /// MaxPicOrderCntLsb = 2^log2_max_poc_lsb
    pub fn max_poc_lsb(&self) -> i32 {
        1i32 << self.log2_max_poc_lsb.min(30)
    }
}

/// PPS 中与参考帧管理相关的字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pps {
    /// pic_parameter_set_id
    pub pps_id: u32,
    /// 引用的 seq_parameter_set_id
    pub sps_id: u32,
    /// bottom_field_pic_order_in_frame_present_flag
    pub pic_order_present: bool,
    /// redundant_pic_cnt_present_flag
    pub redundant_pic_cnt_present: bool,
}

// ============================================================
// Slice Header
// ============================================================

/// slice_type (取模 5 后的值)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    P,
    B,
    I,
    Sp,
    Si,
}

impl SliceType {
    /// 从码流中的 slice_type 创建 (5-9 与 0-4 含义相同)
    pub fn from_raw(raw: u32) -> Self {
        match raw % 5 {
            0 => Self::P,
            1 => Self::B,
            2 => Self::I,
            3 => Self::Sp,
            _ => Self::Si,
        }
    }

    /// 是否为帧内 slice
    pub fn is_intra(&self) -> bool {
        matches!(self, Self::I | Self::Si)
    }
}

/// 解析后的 slice header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceHeader {
    pub first_mb: u32,
    pub slice_type: SliceType,
    pub pps_id: u32,
    pub frame_num: u32,
    pub field_pic: bool,
    pub bottom_field: bool,
    pub nal_ref_idc: u8,
    pub is_idr: bool,
    pub idr_pic_id: u32,
    pub pic_order_cnt_lsb: u32,
    pub delta_poc_bottom: i32,
    pub redundant_pic_cnt: u32,
    pub dec_ref_pic_marking: DecRefPicMarking,
}

impl SliceHeader {
    /// 是否为参考图像的 slice
    pub fn is_reference(&self) -> bool {
        self.nal_ref_idc != 0
    }
}

/// dec_ref_pic_marking() 语法
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecRefPicMarking {
    /// no_output_of_prior_pics_flag (仅 IDR)
    pub no_output_of_prior_pics: bool,
    /// long_term_reference_flag (仅 IDR)
    pub long_term_reference_flag: bool,
    /// adaptive_ref_pic_marking_mode_flag (仅非 IDR)
    pub adaptive: bool,
    /// MMCO 操作序列, 按码流顺序
    pub ops: Vec<MmcoOp>,
}

impl DecRefPicMarking {
    /// 是否包含 MMCO5
    pub fn has_memory_reset(&self) -> bool {
        self.adaptive && self.ops.iter().any(|op| matches!(op, MmcoOp::ClearAll))
    }
}

/// memory_management_control_operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmcoOp {
    /// MMCO1: 短期参考帧标记为不参考
    ForgetShort { difference_of_pic_nums_minus1: u32 },
    /// MMCO2: 长期参考帧标记为不参考
    ForgetLong { long_term_pic_num: u32 },
    /// MMCO3: 短期参考帧转为长期参考帧
    ConvertShortToLong {
        difference_of_pic_nums_minus1: u32,
        long_term_frame_idx: u32,
    },
    /// MMCO4: 设置长期帧索引上限
    TrimLong { max_long_term_frame_idx_plus1: u32 },
    /// MMCO5: 所有参考帧标记为不参考
    ClearAll,
    /// MMCO6: 当前图像标记为长期参考帧
    MarkCurrentLong { long_term_frame_idx: u32 },
}

impl MmcoOp {
    /// 码流中的操作编号 (1-6)
    pub fn opcode(&self) -> u32 {
        match self {
            Self::ForgetShort { .. } => 1,
            Self::ForgetLong { .. } => 2,
            Self::ConvertShortToLong { .. } => 3,
            Self::TrimLong { .. } => 4,
            Self::ClearAll => 5,
            Self::MarkCurrentLong { .. } => 6,
        }
    }
}

/// 一个 slice: 解析后的头部 + 原始 NAL 数据
#[derive(Debug, Clone)]
pub struct Slice {
    pub header: SliceHeader,
    /// slice NAL 数据 (交给外部解码后端)
    pub data: Bytes,
}

impl Slice {
    pub fn new(header: SliceHeader, data: Bytes) -> Self {
        Self { header, data }
    }
}
