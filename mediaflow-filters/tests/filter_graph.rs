//! Filter graphs driven through the public `Filterer` stage.
//!
//! ## Property-Based Tests
//!
//! Frame-rate conversion holds frames back between calls, so the batching
//! property checks that how frames are grouped into `filter` calls never
//! changes what comes out.

use mediaflow_core::{ChannelLayout, Frame, PixelFormat, Rational, SampleFormat, StageState};
use mediaflow_filters::{
    filters, AudioLink, Filterer, FiltererOptions, LinkProps, NamedFrames, VideoLink,
};
use proptest::prelude::*;

const TB: Rational = Rational { num: 1, den: 25 };

fn video_link(w: u32, h: u32) -> LinkProps {
    LinkProps::Video(VideoLink::new(w, h, PixelFormat::Yuv420p, TB).with_frame_rate(Rational::new(25, 1)))
}

/// Test helper: a yuv420p frame whose bytes encode its index.
fn video_frame(w: u32, h: u32, index: i64) -> Frame {
    let mut frame = Frame::video(w, h, PixelFormat::Yuv420p).allocated().unwrap();
    let size = PixelFormat::Yuv420p.image_size(w, h);
    let image: Vec<u8> = (0..size).map(|i| ((i as i64 + index) % 251) as u8).collect();
    frame.fill_from_packed(&image);
    frame.pts = Some(index);
    frame.duration = 1;
    frame.time_base = TB;
    frame
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_split_scale_and_flip() {
    let options = FiltererOptions::new("[in]split[a][b];[a]scale=4:2[small];[b]vflip[big]")
        .with_input("in", video_link(8, 4))
        .with_output("small")
        .with_output("big");
    let mut filterer = Filterer::new(options).await.unwrap();

    let frames: Vec<Frame> = (0..3).map(|i| video_frame(8, 4, i)).collect();
    let out = filterer.filter(frames).await.unwrap();
    let names: Vec<_> = out.outputs.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["small", "big"]);

    let small = out.frames("small").unwrap();
    assert_eq!(small.len(), 3);
    assert_eq!(small[0].video_format().unwrap().width, 4);
    assert_eq!(small[2].pts, Some(2));

    let big = out.frames("big").unwrap();
    let original = video_frame(8, 4, 0).to_packed_bytes();
    let flipped = big[0].to_packed_bytes();
    // Last luma row moved to the top.
    assert_eq!(&flipped[..8], &original[24..32]);

    assert!(filterer.flush().await.unwrap().is_empty());
    assert_eq!(filterer.state(), StageState::Terminal);
}

#[tokio::test]
async fn test_fps_conversion_counts_and_timestamps() {
    let mut filterer = Filterer::new(FiltererOptions::simple("fps=10", video_link(4, 4)))
        .await
        .unwrap();
    let mut out = Vec::new();
    for i in 0..25 {
        out.extend(filterer.filter(video_frame(4, 4, i)).await.unwrap().into_frames());
    }
    out.extend(filterer.flush().await.unwrap().into_frames());

    // One second of input at 25 fps is ten frames at 10 fps.
    let pts: Vec<_> = out.iter().map(|f| f.pts.unwrap()).collect();
    assert_eq!(pts, (0..10).collect::<Vec<_>>());
    assert!(out.iter().all(|f| f.time_base == Rational::new(1, 10)));

    let props = filterer.output_props("out").unwrap();
    assert_eq!(props.as_video().unwrap().frame_rate, Rational::new(10, 1));
}

#[tokio::test]
async fn test_audio_volume_chain() {
    let link = AudioLink::new(8000, SampleFormat::S16, ChannelLayout::Mono);
    let options = FiltererOptions::new("[voice]asplit[a][b];[a]volume=0.5[quiet];[b]anull[dry]")
        .with_input("voice", LinkProps::Audio(link))
        .with_output("quiet")
        .with_output("dry");
    let mut filterer = Filterer::new(options).await.unwrap();

    let mut frame = Frame::audio(4, 8000, ChannelLayout::Mono, SampleFormat::S16)
        .allocated()
        .unwrap();
    let samples: Vec<u8> = [1000i16, -1000, 200, -4]
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect();
    frame.fill_from_packed(&samples);
    frame.pts = Some(0);

    let out = filterer
        .filter(NamedFrames::new("voice", vec![frame]))
        .await
        .unwrap();
    let quiet = out.frames("quiet").unwrap()[0].to_packed_bytes();
    let decoded: Vec<i16> = quiet
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    assert_eq!(decoded, vec![500, -500, 100, -2]);
    assert_eq!(out.frames("dry").unwrap()[0].to_packed_bytes(), samples);
    // Frames adopt the pad time base when they carry none.
    assert_eq!(out.frames("dry").unwrap()[0].time_base, Rational::new(1, 8000));
}

#[tokio::test]
async fn test_mismatched_frame_rejected() {
    let mut filterer = Filterer::new(FiltererOptions::simple("null", video_link(4, 4)))
        .await
        .unwrap();
    let err = filterer.filter(video_frame(8, 8, 0)).await.unwrap_err();
    assert!(matches!(err, mediaflow_core::Error::InvalidArgument(_)));
    // The stage stays usable after a rejected frame.
    assert_eq!(filterer.filter(video_frame(4, 4, 0)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_zero_pad_time_base_rejected_at_build() {
    let link = LinkProps::Video(VideoLink::new(4, 4, PixelFormat::Yuv420p, Rational::zero()));
    let err = Filterer::new(FiltererOptions::simple("null", link))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, mediaflow_core::Error::InvalidArgument(_)));
}

#[test]
fn test_every_registered_filter_builds() {
    for (name, info) in filters() {
        let link = match info.media_type {
            mediaflow_core::MediaType::Audio => LinkProps::Audio(AudioLink::new(
                8000,
                SampleFormat::S16,
                ChannelLayout::Mono,
            )),
            _ => video_link(4, 4),
        };
        let options = match *name {
            "split" | "asplit" => FiltererOptions::new(format!("[in]{}[a][b]", name))
                .with_input("in", link)
                .with_output("a")
                .with_output("b"),
            "interleave" | "ainterleave" => FiltererOptions::new(format!("[x][y]{}[out]", name))
                .with_input("x", link)
                .with_input("y", link)
                .with_output("out"),
            _ => FiltererOptions::simple(name.to_string(), link),
        };
        let built = runtime().block_on(Filterer::new(options));
        assert!(built.is_ok(), "{} failed to build", name);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_fps_output_independent_of_batching(
        cuts in proptest::collection::vec(1usize..6, 1..10),
        rate in prop_oneof![Just("10"), Just("30000/1001"), Just("50")],
    ) {
        let rt = runtime();
        let run = |batches: Vec<Vec<Frame>>| {
            rt.block_on(async {
                let mut filterer = Filterer::new(FiltererOptions::simple(
                    format!("fps={}", rate),
                    video_link(2, 2),
                ))
                .await
                .unwrap();
                let mut pts = Vec::new();
                for batch in batches {
                    for f in filterer.filter(batch).await.unwrap().into_frames() {
                        pts.push((f.pts, f.to_packed_bytes()[0]));
                    }
                }
                for f in filterer.flush().await.unwrap().into_frames() {
                    pts.push((f.pts, f.to_packed_bytes()[0]));
                }
                pts
            })
        };

        let total: usize = cuts.iter().sum();
        let frames: Vec<Frame> = (0..total as i64).map(|i| video_frame(2, 2, i)).collect();
        let one_by_one = run(frames.iter().cloned().map(|f| vec![f]).collect());

        let mut batched = Vec::new();
        let mut rest = frames.as_slice();
        for cut in &cuts {
            let (head, tail) = rest.split_at(*cut);
            batched.push(head.to_vec());
            rest = tail;
        }
        let grouped = run(batched);

        prop_assert_eq!(&one_by_one, &grouped);
        let ticks: Vec<i64> = one_by_one.iter().filter_map(|(pts, _)| *pts).collect();
        prop_assert!(ticks.windows(2).all(|w| w[1] == w[0] + 1));
    }
}
