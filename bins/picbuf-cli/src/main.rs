//! picbuf-cli - 参考帧轨迹重放工具
//!
//! 读取外部解析器导出的参数集与 slice header 轨迹, 驱动参考帧管理会话,
//! 按输出顺序打印图像. 不做像素解码, 表面由空后端分配.

mod logging;
mod trace;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use serde::Serialize;

use picbuf_h264::config::{DEFAULT_MAX_LONG_TERM_FRAME_IDX, DEFAULT_MAX_REF_FRAMES};
use picbuf_h264::{DpbConfig, NullBackend, Picture, PictureType, Session};

use trace::TraceEvent;

#[derive(Parser, Debug)]
#[command(name = "picbuf-cli", version, about = "H.264 参考帧管理轨迹重放工具")]
struct Cli {
    /// 轨迹文件路径 (JSON Lines), "-" 表示标准输入
    input: PathBuf,

    /// 参考帧容量上限 (0-16)
    #[arg(long, default_value_t = DEFAULT_MAX_REF_FRAMES)]
    max_ref_frames: u32,

    /// 长期帧索引上限, -1 表示不允许长期参考帧
    #[arg(long, default_value_t = DEFAULT_MAX_LONG_TERM_FRAME_IDX, allow_negative_numbers = true)]
    max_long_term_frame_idx: i32,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 遇到可恢复错误时继续处理
    #[arg(short = 'k', long)]
    keep_going: bool,

    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

// ============================================================
// 输出结构体
// ============================================================

/// 一幅输出图像
#[derive(Serialize)]
struct OutputRecord {
    index: usize,
    poc: i32,
    frame_num: u32,
    picture_type: &'static str,
    is_reference: bool,
    is_long_term: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    surface: Option<u32>,
}

impl OutputRecord {
    fn new(index: usize, picture: &Picture) -> Self {
        Self {
            index,
            poc: picture.poc,
            frame_num: picture.frame_num,
            picture_type: match picture.picture_type {
                PictureType::I => "I",
                PictureType::P => "P",
                PictureType::B => "B",
            },
            is_reference: picture.is_reference,
            is_long_term: picture.is_long_term,
            surface: picture.surface_id(),
        }
    }
}

/// 重放汇总
#[derive(Serialize)]
struct Summary {
    outputs: Vec<OutputRecord>,
    pictures_decoded: u64,
    marking_misses: u64,
    memory_resets: u64,
    orphan_slices: u64,
    errors: usize,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init("picbuf-cli", cli.verbose) {
        eprintln!("警告: 日志初始化失败: {e:#}");
    }

    if let Err(e) = run(&cli) {
        eprintln!("错误: {e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let events = if cli.input.as_os_str() == "-" {
        trace::read_events(io::stdin().lock())?
    } else {
        let file = File::open(&cli.input)
            .with_context(|| format!("无法打开轨迹文件 '{}'", cli.input.display()))?;
        trace::read_events(BufReader::new(file))?
    };
    info!("读取轨迹: {} 个事件", events.len());

    let config = DpbConfig {
        max_ref_frames: cli.max_ref_frames,
        max_long_term_frame_idx: cli.max_long_term_frame_idx,
    };
    let summary = replay(config, events, cli.keep_going)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

/// 把事件依次送入会话, 收集输出图像
fn replay(config: DpbConfig, events: Vec<TraceEvent>, keep_going: bool) -> Result<Summary> {
    let outputs: Arc<Mutex<Vec<OutputRecord>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&outputs);
    let mut session = Session::new(
        config,
        NullBackend::new(0, 0),
        Box::new(move |picture: Picture| record_output(&sink, &picture)),
    )?;

    let mut errors = 0usize;
    let mut saw_eos = false;
    for (idx, event) in events.into_iter().enumerate() {
        let result = match event {
            TraceEvent::Sps(record) => session.handle_sps(record.into()),
            TraceEvent::Pps(record) => session.handle_pps(record.into()),
            TraceEvent::Slice(record) => session.decode_slice(record.into()),
            TraceEvent::MaxRefFrames { value } => session.set_max_ref_frames(value),
            TraceEvent::MaxLongTermFrameIdx { value } => session.set_max_long_term_frame_idx(value),
            TraceEvent::Eos => {
                saw_eos = true;
                session.end_of_stream()
            }
        };
        if let Err(err) = result {
            if err.is_fatal() || !keep_going {
                return Err(err).with_context(|| format!("处理第 {} 个事件失败", idx + 1));
            }
            warn!("第 {} 个事件出错, 继续处理: {}", idx + 1, err);
            errors += 1;
        }
    }
    if !saw_eos {
        session.end_of_stream()?;
    }

    let stats = session.stats();
    drop(session);
    let outputs = match Arc::try_unwrap(outputs) {
        Ok(mutex) => mutex.into_inner().unwrap_or_else(|e| e.into_inner()),
        Err(shared) => std::mem::take(&mut *shared.lock().unwrap_or_else(|e| e.into_inner())),
    };
    Ok(Summary {
        outputs,
        pictures_decoded: stats.pictures_decoded,
        marking_misses: stats.marking_misses,
        memory_resets: stats.memory_resets,
        orphan_slices: stats.orphan_slices,
        errors,
    })
}

/// 追加一条输出记录, 锁中毒时仍然记录
fn record_output(outputs: &Mutex<Vec<OutputRecord>>, picture: &Picture) {
    let mut list = outputs.lock().unwrap_or_else(|e| e.into_inner());
    let index = list.len();
    list.push(OutputRecord::new(index, picture));
}

fn print_summary(summary: &Summary) {
    for out in &summary.outputs {
        println!(
            "#{:<4} poc={:<6} frame_num={:<4} type={} ref={}{}",
            out.index,
            out.poc,
            out.frame_num,
            out.picture_type,
            out.is_reference,
            if out.is_long_term { " (long-term)" } else { "" },
        );
    }
    println!(
        "已解码 {} 幅, 已输出 {} 幅, 标记未命中 {} 次, MMCO5 {} 次, 孤立 slice {} 个, 错误 {} 个",
        summary.pictures_decoded,
        summary.outputs.len(),
        summary.marking_misses,
        summary.memory_resets,
        summary.orphan_slices,
        summary.errors,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::io::Write;

    fn parse(text: &str) -> Vec<TraceEvent> {
        trace::read_events(text.as_bytes()).expect("轨迹应可解析")
    }

    const IBP_TRACE: &str = r#"
{"type":"sps","sps_id":0,"profile_idc":77,"max_num_ref_frames":2,"log2_max_frame_num":4,"log2_max_poc_lsb":6,"width":64,"height":64}
{"type":"pps","pps_id":0,"sps_id":0}
{"type":"slice","frame_num":0,"nal_ref_idc":3,"idr":true,"slice_type":7,"poc_lsb":0}
{"type":"slice","frame_num":1,"nal_ref_idc":2,"slice_type":5,"poc_lsb":6}
{"type":"slice","frame_num":2,"nal_ref_idc":0,"slice_type":6,"poc_lsb":2}
{"type":"slice","frame_num":2,"nal_ref_idc":0,"slice_type":6,"poc_lsb":4}
{"type":"slice","frame_num":2,"nal_ref_idc":2,"slice_type":5,"poc_lsb":12}
{"type":"eos"}
"#;

    #[test]
    fn test_replay_prints_output_order() {
        let summary = replay(DpbConfig::default(), parse(IBP_TRACE), false).expect("重放应成功");
        let pocs: Vec<i32> = summary.outputs.iter().map(|out| out.poc).collect();
        assert_eq!(pocs, vec![0, 2, 4, 6, 12]);
        assert_eq!(summary.pictures_decoded, 5);
        assert_eq!(summary.outputs[1].picture_type, "B");
        assert_eq!(summary.errors, 0);
    }

    #[test]
    fn test_replay_flushes_without_explicit_eos() {
        let trace = IBP_TRACE.replace("{\"type\":\"eos\"}", "");
        let summary = replay(DpbConfig::default(), parse(&trace), false).expect("重放应成功");
        assert_eq!(summary.outputs.len(), 5, "缺少 eos 时也应输出全部图像");
    }

    #[test]
    fn test_replay_keep_going_counts_recoverable_errors() {
        let trace = format!(
            "{}\n{}",
            IBP_TRACE.replace("{\"type\":\"eos\"}", ""),
            r#"{"type":"slice","pps_id":7,"frame_num":3,"nal_ref_idc":2,"slice_type":5,"poc_lsb":14}"#
        );
        let err = replay(DpbConfig::default(), parse(&trace), false);
        assert!(err.is_err(), "缺失 PPS 默认应中止");

        let summary = replay(DpbConfig::default(), parse(&trace), true).expect("-k 时应继续");
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.orphan_slices, 1);
    }

    #[test]
    fn test_run_reads_trace_file() {
        let mut file = tempfile::NamedTempFile::new().expect("创建临时文件失败");
        file.write_all(IBP_TRACE.as_bytes())
            .expect("写入轨迹失败");
        let cli = Cli::parse_from([
            OsStr::new("picbuf-cli"),
            OsStr::new("--json"),
            OsStr::new("--max-ref-frames"),
            OsStr::new("2"),
            file.path().as_os_str(),
        ]);
        assert_eq!(cli.max_ref_frames, 2);
        assert_eq!(cli.max_long_term_frame_idx, -1);
        run(&cli).expect("重放应成功");
    }

    #[test]
    fn test_run_reports_missing_file() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let missing = dir.path().join("missing.jsonl");
        let cli = Cli::parse_from([OsStr::new("picbuf-cli"), missing.as_os_str()]);
        let err = run(&cli).expect_err("文件不存在应报错");
        assert!(err.to_string().contains("无法打开轨迹文件"));
    }

    #[test]
    fn test_record_output_survives_poisoned_lock() {
        let outputs: Arc<Mutex<Vec<OutputRecord>>> = Arc::new(Mutex::new(Vec::new()));
        record_output(&outputs, &Picture::new(0, 0, true));

        let shared = Arc::clone(&outputs);
        let poisoned = std::thread::spawn(move || {
            let _guard = shared.lock().expect("锁不应中毒");
            panic!("持锁线程崩溃");
        })
        .join();
        assert!(poisoned.is_err());
        assert!(outputs.is_poisoned());

        record_output(&outputs, &Picture::new(2, 1, true));
        let list = outputs.lock().unwrap_or_else(|e| e.into_inner());
        let pocs: Vec<i32> = list.iter().map(|out| out.poc).collect();
        assert_eq!(pocs, vec![0, 2], "锁中毒后不应丢失图像");
        assert_eq!(list[1].index, 1);
    }

    #[test]
    fn test_replay_fatal_error_aborts_even_with_keep_going() {
        let trace = r#"{"type":"sps","sps_id":0,"profile_idc":100,"max_num_ref_frames":2,"log2_max_frame_num":4,"poc_type":2,"log2_max_poc_lsb":6,"width":64,"height":64}"#;
        let result = replay(DpbConfig::default(), parse(trace), true);
        assert!(result.is_err(), "不支持的 POC 类型是致命错误");
    }
}
