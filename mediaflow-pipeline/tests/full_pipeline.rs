//! Jobs run end to end over `mpk` files in a temporary directory.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mediaflow_codecs::{Decoder, Encoder, EncoderConfig};
use mediaflow_containers::{
    Demuxer, FormatOptions, IoOptions, Muxer, MuxerOptions, SeekOptions, StreamOptions,
};
use mediaflow_core::{
    ChannelLayout, Frame, MediaType, Packet, PixelFormat, Rational, SampleFormat,
};
use mediaflow_pipeline::{Pipeline, PipelineConfig, PipelineError};
use tempfile::TempDir;

const WIDTH: u32 = 16;
const HEIGHT: u32 = 8;
const FRAMES: i64 = 30;
const GOP: u32 = 6;

fn video_frame(index: i64) -> Frame {
    let mut frame = Frame::video(WIDTH, HEIGHT, PixelFormat::Yuv420p)
        .allocated()
        .unwrap();
    let size = PixelFormat::Yuv420p.image_size(WIDTH, HEIGHT);
    let image: Vec<u8> = (0..size).map(|i| ((i as i64 * 5 + index) % 256) as u8).collect();
    frame.fill_from_packed(&image);
    frame.pts = Some(index);
    frame.duration = 1;
    frame.time_base = Rational::new(1, 25);
    frame
}

fn audio_frame(index: i64) -> Frame {
    let mut frame = Frame::audio(320, 8000, ChannelLayout::Mono, SampleFormat::S16)
        .allocated()
        .unwrap();
    frame.pts = Some(index * 320);
    frame.time_base = Rational::new(1, 8000);
    frame
}

/// Test helper: a 1.2 s `mpk` file with delta video (stream 0) and PCM
/// audio (stream 1).
async fn write_fixture(path: &Path) {
    let mut venc = Encoder::new(
        EncoderConfig::video("delta", WIDTH, HEIGHT, PixelFormat::Yuv420p).with_gop(GOP, 1),
    )
    .unwrap();
    let mut aenc = Encoder::new(EncoderConfig::audio(
        "pcm_s16le",
        8000,
        ChannelLayout::Mono,
        SampleFormat::S16,
    ))
    .unwrap();

    let mut muxer = Muxer::new(MuxerOptions::format_name("mpk")).unwrap();
    muxer
        .new_stream(
            StreamOptions::new("delta", venc.time_base())
                .with_codecpar(venc.codec_parameters().clone()),
        )
        .unwrap();
    muxer
        .new_stream(
            StreamOptions::new("pcm_s16le", aenc.time_base())
                .with_codecpar(aenc.codec_parameters().clone()),
        )
        .unwrap();
    muxer
        .open_io(IoOptions::new(path.to_str().unwrap()))
        .await
        .unwrap();
    muxer.write_header(FormatOptions::new()).await.unwrap();

    for i in 0..FRAMES {
        let video = venc.encode(video_frame(i)).await.unwrap().packets;
        muxer.write_frame(video).await.unwrap();
        let mut audio = aenc.encode(audio_frame(i)).await.unwrap().packets;
        for p in &mut audio {
            p.stream_index = 1;
        }
        muxer.write_frame(audio).await.unwrap();
    }
    muxer
        .write_frame(venc.flush().await.unwrap().packets)
        .await
        .unwrap();
    muxer.write_trailer().await.unwrap();
}

async fn fixture() -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.mpk");
    write_fixture(&input).await;
    (dir, input.to_str().unwrap().to_string())
}

fn output_path(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_str().unwrap().to_string()
}

async fn read_packets(url: &str) -> (Demuxer, Vec<Packet>) {
    let mut demuxer = Demuxer::open(url).await.unwrap();
    let mut packets = Vec::new();
    while let Some(packet) = demuxer.read().await.unwrap() {
        packets.push(packet);
    }
    (demuxer, packets)
}

/// Test helper: decode every frame of one stream.
async fn decode_stream(url: &str, index: usize) -> Vec<Frame> {
    let (demuxer, packets) = read_packets(url).await;
    let mut decoder = Decoder::from_stream(&demuxer.streams()[index]).unwrap();
    let mut frames = Vec::new();
    for packet in packets.into_iter().filter(|p| p.stream_index == index) {
        frames.extend(decoder.decode(packet).await.unwrap().frames);
    }
    frames.extend(decoder.flush().await.unwrap().frames);
    frames
}

#[tokio::test]
async fn test_copy_every_stream() {
    let (dir, input) = fixture().await;
    let output = output_path(&dir, "copy.mpk");

    let mut pipeline = Pipeline::new(PipelineConfig::new(&input, &output)).unwrap();
    let stats = pipeline.run().await.unwrap();
    assert_eq!(stats.packets_copied, stats.packets_read);
    assert_eq!(stats.packets_written, stats.packets_read);
    assert_eq!(stats.frames_decoded, 0);

    let (_, original) = read_packets(&input).await;
    let (demuxer, copied) = read_packets(&output).await;
    assert_eq!(demuxer.streams().len(), 2);
    assert_eq!(copied.len(), original.len());
    for stream in 0..2 {
        let a: Vec<_> = original.iter().filter(|p| p.stream_index == stream).collect();
        let b: Vec<_> = copied.iter().filter(|p| p.stream_index == stream).collect();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.data(), y.data());
            assert_eq!((x.pts, x.dts), (y.pts, y.dts));
        }
    }
}

#[tokio::test]
async fn test_transcode_with_scale_and_copy_audio() {
    let (dir, input) = fixture().await;
    let output = output_path(&dir, "scaled.mpk");

    let config = PipelineConfig::new(&input, &output)
        .transcode(
            0,
            EncoderConfig::default().with_gop(10, 2),
            Some("scale=8:4"),
        )
        .copy(1);
    let stats = Pipeline::new(config).unwrap().run().await.unwrap();
    assert_eq!(stats.frames_decoded, FRAMES as u64);
    assert_eq!(stats.frames_filtered, FRAMES as u64);
    assert_eq!(stats.packets_encoded, FRAMES as u64);

    let (demuxer, _) = read_packets(&output).await;
    let video = &demuxer.streams()[0];
    assert_eq!(video.codecpar.codec_name(), "delta");
    assert_eq!((video.codecpar.width, video.codecpar.height), (8, 4));
    assert_eq!(video.codecpar.gop_size, 10);
    assert_eq!(demuxer.streams()[1].media_type(), MediaType::Audio);

    let frames = decode_stream(&output, 0).await;
    let pts: Vec<_> = frames.iter().map(|f| f.pts.unwrap()).collect();
    assert_eq!(pts, (0..FRAMES).collect::<Vec<_>>());
    assert!(frames
        .iter()
        .all(|f| f.video_format().map(|v| (v.width, v.height)) == Some((8, 4))));
}

#[tokio::test]
async fn test_frame_rate_conversion_drains_filter() {
    let (dir, input) = fixture().await;
    let output = output_path(&dir, "fps.mpk");

    let config = PipelineConfig::new(&input, &output).transcode(
        0,
        EncoderConfig::default(),
        Some("fps=10"),
    );
    let stats = Pipeline::new(config).unwrap().run().await.unwrap();
    // 1.2 s of video at 10 fps; the audio stream is not mapped.
    assert_eq!(stats.frames_filtered, 12);
    assert_eq!(stats.packets_skipped, stats.packets_read - FRAMES as u64);

    let (demuxer, _) = read_packets(&output).await;
    assert_eq!(demuxer.streams().len(), 1);
    assert_eq!(demuxer.streams()[0].time_base, Rational::new(1, 10));
    assert_eq!(decode_stream(&output, 0).await.len(), 12);
}

#[tokio::test]
async fn test_start_seek_skips_leading_packets() {
    let (dir, input) = fixture().await;
    let output = output_path(&dir, "seek.mpk");

    let config = PipelineConfig::new(&input, &output)
        .copy(0)
        .start(SeekOptions::time(0.6));
    let stats = Pipeline::new(config).unwrap().run().await.unwrap();
    assert!(stats.packets_read < FRAMES as u64 * 2);

    let (_, packets) = read_packets(&output).await;
    assert!(!packets.is_empty());
    assert!(packets[0].is_key());
    // Nothing before the 0.6 s mark (frame 15) survives the seek.
    assert!(packets.iter().all(|p| p.pts.unwrap() >= 15));
}

#[tokio::test]
async fn test_existing_output_needs_overwrite() {
    let (dir, input) = fixture().await;
    let output = output_path(&dir, "exists.mpk");
    std::fs::write(&output, b"keep").unwrap();

    let err = Pipeline::new(PipelineConfig::new(&input, &output))
        .unwrap()
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::OutputExists(_)));
    assert_eq!(std::fs::read(&output).unwrap(), b"keep");

    let config = PipelineConfig::new(&input, &output).overwrite(true);
    Pipeline::new(config).unwrap().run().await.unwrap();
    assert_ne!(std::fs::read(&output).unwrap(), b"keep");
}

#[tokio::test]
async fn test_null_output_and_progress_reports() {
    let (_dir, input) = fixture().await;
    let reports = Arc::new(AtomicU64::new(0));
    let seen = Arc::clone(&reports);

    let config = PipelineConfig::new(&input, "")
        .output_format("null")
        .transcode(0, EncoderConfig::default(), Some("hflip"))
        .copy(1)
        .progress_interval(10);
    let mut pipeline = Pipeline::new(config).unwrap().on_progress(move |stats| {
        assert_eq!(stats.packets_read % 10, 0);
        seen.fetch_add(1, Ordering::SeqCst);
    });
    let stats = pipeline.run().await.unwrap();
    assert_eq!(reports.load(Ordering::SeqCst), stats.packets_read / 10);
    assert_eq!(pipeline.stats().packets_read, stats.packets_read);
    assert_eq!(
        stats.packets_written,
        stats.packets_encoded + stats.packets_copied
    );
}

#[tokio::test]
async fn test_job_file() {
    let (dir, input) = fixture().await;
    let output = output_path(&dir, "job.mpk");
    let job = dir.path().join("job.json");
    let json = format!(
        r#"{{
            "input": {{ "url": {input:?} }},
            "output": {{ "url": {output:?} }},
            "streams": [
                {{ "input": 1, "route": {{ "transcode": {{ "filter": "volume=0.5" }} }} }}
            ]
        }}"#
    );
    std::fs::write(&job, json).unwrap();

    let config = PipelineConfig::from_file(&job).unwrap();
    let stats = Pipeline::new(config).unwrap().run().await.unwrap();
    assert_eq!(stats.frames_decoded, FRAMES as u64);

    let (demuxer, _) = read_packets(&output).await;
    assert_eq!(demuxer.streams().len(), 1);
    assert_eq!(demuxer.streams()[0].codecpar.codec_name(), "pcm_s16le");
}

#[tokio::test]
async fn test_unknown_stream_and_bad_filter() {
    let (dir, input) = fixture().await;

    let config = PipelineConfig::new(&input, output_path(&dir, "a.mpk")).copy(5);
    let err = Pipeline::new(config).unwrap().run().await.unwrap_err();
    assert!(matches!(err, PipelineError::StreamNotFound(5)));

    let config = PipelineConfig::new(&input, output_path(&dir, "b.mpk")).transcode(
        0,
        EncoderConfig::default(),
        Some("blur"),
    );
    let err = Pipeline::new(config).unwrap().run().await.unwrap_err();
    assert!(matches!(
        err.core(),
        Some(mediaflow_core::Error::UnsupportedFormat(_))
    ));
}
