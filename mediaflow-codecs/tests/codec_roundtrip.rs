//! Encode/decode round trips through the public stages.
//!
//! ## Property-Based Tests
//!
//! The batching tests use `proptest` to check that how packets are grouped
//! into `decode` calls never changes which frames come out.

use mediaflow_codecs::{Decoder, DecoderConfig, Encoder, EncoderConfig, StageState};
use mediaflow_core::{
    ChannelLayout, Frame, Packet, PixelFormat, Rational, SampleFormat, Stream,
};
use proptest::prelude::*;

const WIDTH: u32 = 8;
const HEIGHT: u32 = 4;

/// Test helper: a yuv420p frame with a moving gradient.
fn test_frame(index: i64) -> Frame {
    let mut frame = Frame::video(WIDTH, HEIGHT, PixelFormat::Yuv420p)
        .allocated()
        .unwrap();
    let size = PixelFormat::Yuv420p.image_size(WIDTH, HEIGHT);
    let image: Vec<u8> = (0..size)
        .map(|i| ((i as i64 + index * 7) % 251) as u8)
        .collect();
    frame.fill_from_packed(&image);
    frame.pts = Some(index);
    frame.time_base = Rational::new(1, 25);
    frame
}

/// Test helper: encode `count` frames with the delta codec, flush included.
async fn encode_delta(count: i64, gop: u32, b_frames: u32) -> (Encoder, Vec<Packet>) {
    let config = EncoderConfig::video("delta", WIDTH, HEIGHT, PixelFormat::Yuv420p)
        .with_gop(gop, b_frames);
    let mut enc = Encoder::new(config).unwrap();
    let mut packets = Vec::new();
    for i in 0..count {
        packets.extend(enc.encode(test_frame(i)).await.unwrap().packets);
    }
    packets.extend(enc.flush().await.unwrap().packets);
    (enc, packets)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap()
}

fn delta_decoder(enc: &Encoder) -> Decoder {
    let stream = Stream::new(0, enc.time_base(), enc.codec_parameters().clone());
    Decoder::from_stream(&stream).unwrap()
}

#[tokio::test]
async fn test_two_second_gop_scenario() {
    let config = EncoderConfig::video("delta", WIDTH, HEIGHT, PixelFormat::Yuv420p)
        .with_gop(12, 2)
        .with_frame_rate(Rational::new(25, 1));
    let mut enc = Encoder::new(config).unwrap();
    let mut packets = Vec::new();
    let mut empty_calls = 0;
    for i in 0..50 {
        let out = enc.encode(test_frame(i)).await.unwrap();
        if out.packets.is_empty() {
            empty_calls += 1;
        }
        packets.extend(out.packets);
    }
    assert!(empty_calls > 0);
    packets.extend(enc.flush().await.unwrap().packets);
    assert_eq!(packets.len(), 50);
    assert!(packets.windows(2).all(|w| w[0].dts <= w[1].dts));
    assert_eq!(packets.iter().filter(|p| p.is_key()).count(), 5);

    let mut dec = delta_decoder(&enc);
    let mut frames = Vec::new();
    let mut empty_decodes = 0;
    for packet in packets {
        let out = dec.decode(packet).await.unwrap();
        if out.frames.is_empty() {
            empty_decodes += 1;
        }
        frames.extend(out.frames);
    }
    assert!(empty_decodes > 0);
    frames.extend(dec.flush().await.unwrap().frames);
    assert_eq!(frames.len(), 50);

    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.pts, Some(i as i64));
        assert!(!frame.is_corrupt());
        assert_eq!(frame.to_packed_bytes(), test_frame(i as i64).to_packed_bytes());
    }
}

#[tokio::test]
async fn test_decoder_terminal_after_flush() {
    let (enc, packets) = encode_delta(4, 4, 1).await;
    let mut dec = delta_decoder(&enc);
    dec.decode(packets).await.unwrap();
    dec.flush().await.unwrap();
    assert_eq!(dec.state(), StageState::Terminal);
    assert!(dec.flush().await.unwrap_err().is_sequence_violation());
}

#[tokio::test]
async fn test_reset_drops_reference() {
    let (enc, packets) = encode_delta(6, 6, 0).await;
    let mut dec = delta_decoder(&enc);
    dec.decode(packets[..2].to_vec()).await.unwrap();
    dec.reset().unwrap();
    assert_eq!(dec.buffered(), 0);

    // P-frame with no anchor after the reset.
    let out = dec.decode(packets[2].clone()).await.unwrap();
    let mut frames = out.frames;
    frames.extend(dec.flush().await.unwrap().frames);
    assert_eq!(frames.len(), 1);
    assert!(frames[0].is_corrupt());
}

#[tokio::test]
async fn test_pcm_round_trip() {
    let mut enc = Encoder::new(EncoderConfig::audio(
        "pcm_s16le",
        8000,
        ChannelLayout::Stereo,
        SampleFormat::S16,
    ))
    .unwrap();
    let mut frame = Frame::audio(80, 8000, ChannelLayout::Stereo, SampleFormat::S16)
        .allocated()
        .unwrap();
    let samples: Vec<u8> = (0..320).map(|i| i as u8).collect();
    frame.fill_from_packed(&samples);
    frame.pts = Some(160);
    let packets = enc.encode(frame).await.unwrap().packets;
    assert_eq!(packets[0].size(), 320);

    let mut dec = Decoder::new(
        DecoderConfig::by_name("pcm_s16le")
            .with_audio(8000, ChannelLayout::Stereo, SampleFormat::S16)
            .with_time_base(enc.time_base()),
    )
    .unwrap();
    let frames = dec.decode(packets).await.unwrap().frames;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].pts, Some(160));
    assert_eq!(frames[0].audio_format().map(|a| a.nb_samples), Some(80));
    assert_eq!(frames[0].to_packed_bytes(), samples);
}

async fn decode_in_batches(enc: &Encoder, packets: &[Packet], splits: &[usize]) -> Vec<i64> {
    let mut dec = delta_decoder(enc);
    let mut frames = Vec::new();
    let mut start = 0;
    for &len in splits {
        if start >= packets.len() {
            break;
        }
        let end = (start + len).min(packets.len());
        frames.extend(dec.decode(packets[start..end].to_vec()).await.unwrap().frames);
        start = end;
    }
    if start < packets.len() {
        frames.extend(dec.decode(packets[start..].to_vec()).await.unwrap().frames);
    }
    frames.extend(dec.flush().await.unwrap().frames);
    frames.iter().map(|f| f.pts.unwrap()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Batch boundaries never change the decoded frame sequence.
    #[test]
    fn prop_batching_is_invisible(
        count in 1i64..30,
        gop in 1u32..10,
        b_frames in 0u32..4,
        splits in proptest::collection::vec(1usize..6, 1..20),
    ) {
        let (one_by_one, batched, produced) = runtime().block_on(async {
            let (enc, packets) = encode_delta(count, gop, b_frames).await;
            let one_by_one = decode_in_batches(&enc, &packets, &[1; 64]).await;
            let batched = decode_in_batches(&enc, &packets, &splits).await;
            (one_by_one, batched, packets.len() as i64)
        });
        prop_assert_eq!(produced, count);
        prop_assert_eq!(&one_by_one, &batched);
        prop_assert_eq!(batched, (0..count).collect::<Vec<_>>());
    }

    /// Encoder output is always in non-decreasing dts order.
    #[test]
    fn prop_encoder_dts_sorted(count in 1i64..40, gop in 1u32..16, b_frames in 0u32..5) {
        let (_, packets) = runtime().block_on(encode_delta(count, gop, b_frames));
        for w in packets.windows(2) {
            prop_assert!(w[0].dts <= w[1].dts);
        }
        for p in &packets {
            prop_assert!(p.dts <= p.pts);
        }
    }
}
