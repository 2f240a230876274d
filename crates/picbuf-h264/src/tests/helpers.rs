use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::dpb::Dpb;
use crate::picture::Picture;
use crate::syntax::{DecRefPicMarking, Pps, Slice, SliceHeader, SliceType, Sps};

/// 记录输出回调收到的图像
pub type OutputLog = Arc<Mutex<Vec<Picture>>>;

pub fn recording_output() -> (crate::dpb::OutputCallback, OutputLog) {
    let log: OutputLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let callback = Box::new(move |picture: Picture| {
        sink.lock().expect("输出记录锁不应中毒").push(picture);
    });
    (callback, log)
}

pub fn build_test_dpb(max_frames: usize) -> (Dpb, OutputLog) {
    let (callback, log) = recording_output();
    (Dpb::new(max_frames, callback), log)
}

pub fn output_pocs(log: &OutputLog) -> Vec<i32> {
    log.lock()
        .expect("输出记录锁不应中毒")
        .iter()
        .map(|pic| pic.poc)
        .collect()
}

pub fn stored_pocs(dpb: &Dpb) -> Vec<i32> {
    dpb.pictures().iter().map(|pic| pic.poc).collect()
}

pub fn ref_picture(poc: i32, frame_num: u32) -> Picture {
    Picture::new(poc, frame_num, true)
}

pub fn non_ref_picture(poc: i32, frame_num: u32) -> Picture {
    Picture::new(poc, frame_num, false)
}

pub fn long_term_picture(poc: i32, frame_num: u32, long_term_frame_idx: u32) -> Picture {
    let mut pic = Picture::new(poc, frame_num, true);
    pic.set_long_term(long_term_frame_idx);
    pic
}

pub fn build_test_sps(sps_id: u32) -> Sps {
    Sps {
        sps_id,
        profile_idc: 100,
        max_num_ref_frames: 4,
        log2_max_frame_num: 4,
        poc_type: 0,
        log2_max_poc_lsb: 6,
        frame_mbs_only: true,
        width: 16,
        height: 16,
    }
}

pub fn build_test_pps() -> Pps {
    Pps {
        pps_id: 0,
        sps_id: 0,
        pic_order_present: false,
        redundant_pic_cnt_present: false,
    }
}

pub fn build_test_slice_header(
    frame_num: u32,
    nal_ref_idc: u8,
    is_idr: bool,
    pic_order_cnt_lsb: u32,
) -> SliceHeader {
    SliceHeader {
        first_mb: 0,
        slice_type: if is_idr { SliceType::I } else { SliceType::P },
        pps_id: 0,
        frame_num,
        field_pic: false,
        bottom_field: false,
        nal_ref_idc,
        is_idr,
        idr_pic_id: 0,
        pic_order_cnt_lsb,
        delta_poc_bottom: 0,
        redundant_pic_cnt: 0,
        dec_ref_pic_marking: DecRefPicMarking::default(),
    }
}

pub fn build_slice(header: SliceHeader) -> Slice {
    Slice::new(header, Bytes::from_static(&[0x65, 0x88, 0x84]))
}
