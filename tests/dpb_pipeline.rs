//! DPB 与会话的端到端流水.
//!
//! 只通过公开接口驱动:
//! - DPB 输出顺序场景 (容量触发 bump、flush、非参考图像直出)
//! - 长码流跨 frame_num / POC 回绕的输出单调性
//! - 解码表面引用计数守恒

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use picbuf::h264::{
    DpbConfig, NullBackend, OutputCallback, POC_MAX, Picture, Pps, Session, Slice, SliceHeader,
    SliceType, Sps, dpb::Dpb, syntax::DecRefPicMarking,
};

type OutputLog = Arc<Mutex<Vec<Picture>>>;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn recording_output() -> (OutputCallback, OutputLog) {
    let log: OutputLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    (
        Box::new(move |picture: Picture| {
            sink.lock().expect("输出记录锁不应中毒").push(picture);
        }),
        log,
    )
}

fn output_pocs(log: &OutputLog) -> Vec<i32> {
    log.lock()
        .expect("输出记录锁不应中毒")
        .iter()
        .map(|pic| pic.poc)
        .collect()
}

fn stream_sps(max_num_ref_frames: u32) -> Sps {
    Sps {
        sps_id: 0,
        profile_idc: 66,
        max_num_ref_frames,
        log2_max_frame_num: 4,
        poc_type: 0,
        log2_max_poc_lsb: 6,
        frame_mbs_only: true,
        width: 176,
        height: 144,
    }
}

fn stream_pps() -> Pps {
    Pps {
        pps_id: 0,
        sps_id: 0,
        pic_order_present: false,
        redundant_pic_cnt_present: false,
    }
}

fn stream_slice(frame_num: u32, nal_ref_idc: u8, is_idr: bool, lsb: u32) -> Slice {
    let header = SliceHeader {
        first_mb: 0,
        slice_type: if is_idr { SliceType::I } else { SliceType::P },
        pps_id: 0,
        frame_num,
        field_pic: false,
        bottom_field: false,
        nal_ref_idc,
        is_idr,
        idr_pic_id: 0,
        pic_order_cnt_lsb: lsb,
        delta_poc_bottom: 0,
        redundant_pic_cnt: 0,
        dec_ref_pic_marking: DecRefPicMarking::default(),
    };
    Slice::new(header, Bytes::from_static(&[0u8; 8]))
}

#[test]
fn test_dpb_capacity_bump_scenario() {
    init_logger();
    let (callback, log) = recording_output();
    let mut dpb = Dpb::new(4, callback);
    for poc in [0, 4, 2, 1] {
        dpb.add(Picture::new(poc, poc as u32, true))
            .expect("未满时入库应成功");
    }
    assert!(output_pocs(&log).is_empty(), "DPB 未满时不应输出");

    // 第 5 幅参考图像入库前由滑动窗口腾出参考位置
    assert!(dpb.mark_sliding());
    dpb.add(Picture::new(6, 6, true)).expect("入库应成功");
    assert_eq!(output_pocs(&log), vec![0], "应输出 POC 最小的图像");
    let stored: Vec<i32> = dpb.pictures().iter().map(|pic| pic.poc).collect();
    assert_eq!(stored, vec![4, 2, 1, 6]);

    dpb.flush(true);
    assert_eq!(output_pocs(&log), vec![0, 1, 2, 4, 6], "flush 应按 POC 顺序输出");
    assert!(!dpb.bump(POC_MAX), "flush 后不应有可输出图像");
}

#[test]
fn test_dpb_non_reference_picture_passes_through() {
    init_logger();
    let (callback, log) = recording_output();
    let mut dpb = Dpb::new(4, callback);
    for poc in [1, 2, 4] {
        dpb.add(Picture::new(poc, poc as u32, true))
            .expect("入库应成功");
    }
    dpb.add(Picture::new(3, 5, false)).expect("非参考图像应直接输出");
    assert_eq!(output_pocs(&log), vec![1, 2, 3]);
    assert_eq!(dpb.len(), 3, "非参考图像不应入库");
}

#[test]
fn test_session_long_stream_across_wraparound() {
    init_logger();
    let (callback, log) = recording_output();
    let mut session =
        Session::new(DpbConfig::default(), NullBackend::new(176, 144), callback)
            .expect("会话创建应成功");
    session.handle_sps(stream_sps(4)).expect("SPS 应被接受");
    session.handle_pps(stream_pps()).expect("PPS 应被接受");

    // frame_num 每 16 帧回绕, pic_order_cnt_lsb 每 32 帧回绕
    for i in 0..40u32 {
        let slice = stream_slice(i % 16, 1, i == 0, (2 * i) % 64);
        session.decode_slice(slice).expect("slice 应被接受");
        assert!(session.dpb().len() <= 4, "DPB 容量不应超出 SPS 限制");
    }
    session.end_of_stream().expect("流结束应成功");

    let pocs = output_pocs(&log);
    let expected: Vec<i32> = (0..40).map(|i| 2 * i).collect();
    assert_eq!(pocs, expected, "回绕后输出仍应按 POC 递增");
    assert_eq!(session.stats().pictures_decoded, 40);
    assert_eq!(session.stats().marking_misses, 0);
}

#[test]
fn test_session_surface_lifecycle() {
    init_logger();
    let (callback, log) = recording_output();
    let mut session = Session::new(DpbConfig::default(), NullBackend::new(176, 144), callback)
        .expect("会话创建应成功");
    session.handle_sps(stream_sps(2)).expect("SPS 应被接受");
    session.handle_pps(stream_pps()).expect("PPS 应被接受");

    let stream = [
        stream_slice(0, 1, true, 0),
        stream_slice(1, 1, false, 8),
        stream_slice(2, 0, false, 2),
        stream_slice(2, 0, false, 4),
        stream_slice(2, 1, false, 16),
        stream_slice(3, 0, false, 10),
        stream_slice(3, 1, false, 24),
        stream_slice(4, 1, false, 30),
    ];
    for slice in stream {
        session.decode_slice(slice).expect("slice 应被接受");
        let in_dpb = session.dpb().len();
        let consumed = log.lock().expect("输出记录锁不应中毒").len();
        assert_eq!(
            session.backend().outstanding_refs(),
            in_dpb + consumed,
            "表面引用只能由 DPB 或消费者持有"
        );
    }

    session.end_of_stream().expect("流结束应成功");
    assert!(session.dpb().is_empty());
    assert_eq!(
        session.backend().outstanding_refs(),
        session.backend().pool().len(),
        "流结束后每个表面只剩消费者持有的一份"
    );

    log.lock().expect("输出记录锁不应中毒").clear();
    assert_eq!(session.backend().outstanding_refs(), 0, "消费者释放后不应残留引用");
}
