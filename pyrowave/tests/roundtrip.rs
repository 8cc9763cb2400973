// Copyright (c) the PyroWave Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! End-to-end encoder → packetiser → decoder tests.

use pyrowave::{ChromaSubsampling, Decoder, Encoder, Frame, Precision};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

fn make_test_frame(width: usize, height: usize, chroma: ChromaSubsampling, seed: u64) -> Frame {
    let mut frame = Frame::new(width, height, chroma).unwrap();
    let mut rng = XorShiftRng::seed_from_u64(seed);
    for c in 0..3 {
        let plane = frame.plane_mut(c);
        let (w, h) = plane.size();
        for y in 0..h {
            let row = plane.row_mut(y);
            for (x, v) in row.iter_mut().enumerate() {
                let fx = x as f32 * (0.05 + c as f32 * 0.01);
                let fy = y as f32 * 0.07;
                let base = 0.5 + 0.3 * fx.sin() * fy.cos();
                let noise = rng.gen_range(-0.04..0.04);
                *v = (base + noise).clamp(0.0, 1.0);
            }
        }
    }
    frame
}

fn luma_psnr(a: &Frame, b: &Frame) -> f64 {
    let (w, h) = a.plane(0).size();
    let mut mse = 0.0f64;
    for y in 0..h {
        let ra = a.plane(0).row(y);
        let rb = b.plane(0).row(y);
        for x in 0..w {
            let d = (ra[x] - rb[x]) as f64;
            mse += d * d;
        }
    }
    mse /= (w * h) as f64;
    if mse == 0.0 {
        return f64::INFINITY;
    }
    -10.0 * mse.log10()
}

fn frames_identical(a: &Frame, b: &Frame) -> bool {
    (0..3).all(|c| {
        let (w, h) = a.plane(c).size();
        (0..h).all(|y| (0..w).all(|x| a.plane(c).row(y)[x] == b.plane(c).row(y)[x]))
    })
}

#[test]
fn generous_budget_round_trip_is_faithful() {
    for chroma in [ChromaSubsampling::Chroma420, ChromaSubsampling::Chroma444] {
        let frame = make_test_frame(320, 240, chroma, 1);
        let mut encoder = Encoder::new(320, 240, chroma, Precision::Fp32).unwrap();
        let mut decoder = Decoder::new(320, 240, chroma, Precision::Fp32).unwrap();

        let stats = encoder.encode(&frame, 8 << 20).unwrap();
        assert!(!stats.rate_overflow);
        let packets = encoder.packetize(1200);
        assert_eq!(packets.len(), encoder.num_packets(1200));
        assert_eq!(packets.iter().map(|p| p.len()).sum::<usize>(), stats.payload_bytes);

        for packet in packets.iter() {
            decoder.push_packet(packet).unwrap();
        }
        assert!(decoder.decode_is_ready(false));
        let mut out = Frame::new(320, 240, chroma).unwrap();
        assert!(decoder.decode(&mut out, false).unwrap());
        let psnr = luma_psnr(&frame, &out);
        assert!(psnr > 35.0, "psnr {psnr} too low for an unconstrained budget");
    }
}

#[test]
fn rate_budget_is_respected() {
    let frame = make_test_frame(320, 240, ChromaSubsampling::Chroma420, 2);
    let mut psnrs = Vec::new();
    for target in [20_000usize, 60_000, 200_000] {
        let mut encoder =
            Encoder::new(320, 240, ChromaSubsampling::Chroma420, Precision::Fp32).unwrap();
        let mut decoder =
            Decoder::new(320, 240, ChromaSubsampling::Chroma420, Precision::Fp32).unwrap();
        let stats = encoder.encode(&frame, target).unwrap();
        assert!(!stats.rate_overflow, "target {target} should be reachable");
        assert!(
            stats.payload_bytes <= target,
            "payload {} exceeds target {target}",
            stats.payload_bytes
        );
        for packet in encoder.packetize(1400).iter() {
            decoder.push_packet(packet).unwrap();
        }
        let mut out = Frame::new(320, 240, ChromaSubsampling::Chroma420).unwrap();
        assert!(decoder.decode(&mut out, false).unwrap());
        psnrs.push(luma_psnr(&frame, &out));
    }
    assert!(
        psnrs[2] >= psnrs[0] - 0.1,
        "more budget should not lose quality: {psnrs:?}"
    );
    assert!(
        psnrs[0] > 20.0,
        "even the tight budget must stay watchable: {psnrs:?}"
    );
}

#[test]
fn ten_frames_progress_the_sequence() {
    let mut encoder =
        Encoder::new(160, 128, ChromaSubsampling::Chroma420, Precision::Fp32).unwrap();
    let mut decoder =
        Decoder::new(160, 128, ChromaSubsampling::Chroma420, Precision::Fp32).unwrap();
    let mut decoded = 0;
    for i in 0..10u64 {
        let frame = make_test_frame(160, 128, ChromaSubsampling::Chroma420, 100 + i);
        let stats = encoder.encode(&frame, 1 << 20).unwrap();
        assert_eq!(stats.sequence as u64, (i + 1) & 7);
        for packet in encoder.packetize(1400).iter() {
            decoder.push_packet(packet).unwrap();
        }
        let mut out = Frame::new(160, 128, ChromaSubsampling::Chroma420).unwrap();
        assert!(decoder.decode(&mut out, false).unwrap());
        // The frame for this sequence is done; a second decode is refused
        // until the next sequence starts.
        assert!(!decoder.decode_is_ready(true));
        assert!(!decoder.decode(&mut out, true).unwrap());
        decoded += 1;
    }
    assert_eq!(decoded, 10);
}

#[test]
fn reordered_packets_reconstruct_identically() {
    let frame = make_test_frame(256, 192, ChromaSubsampling::Chroma420, 3);
    let mut encoder =
        Encoder::new(256, 192, ChromaSubsampling::Chroma420, Precision::Fp32).unwrap();
    encoder.encode(&frame, 150_000).unwrap();
    let packets = encoder.packetize(1200);
    assert!(packets.len() > 2);

    let mut in_order = Decoder::new(256, 192, ChromaSubsampling::Chroma420, Precision::Fp32).unwrap();
    for packet in packets.iter() {
        in_order.push_packet(packet).unwrap();
    }
    let mut reversed =
        Decoder::new(256, 192, ChromaSubsampling::Chroma420, Precision::Fp32).unwrap();
    for index in (0..packets.len()).rev() {
        reversed.push_packet(packets.packet(index)).unwrap();
    }

    let mut a = Frame::new(256, 192, ChromaSubsampling::Chroma420).unwrap();
    let mut b = Frame::new(256, 192, ChromaSubsampling::Chroma420).unwrap();
    assert!(in_order.decode(&mut a, false).unwrap());
    assert!(reversed.decode(&mut b, false).unwrap());
    assert!(frames_identical(&a, &b));
}

#[test]
fn precision_modes_interoperate() {
    // The bitstream never depends on the storage precision; a Mixed encoder
    // must feed an Fp32 decoder and vice versa.
    let frame = make_test_frame(160, 128, ChromaSubsampling::Chroma420, 4);
    for (enc_precision, dec_precision) in [
        (Precision::Mixed, Precision::Fp32),
        (Precision::Fp32, Precision::Fp16),
        (Precision::Fp16, Precision::Mixed),
    ] {
        let mut encoder =
            Encoder::new(160, 128, ChromaSubsampling::Chroma420, enc_precision).unwrap();
        let mut decoder =
            Decoder::new(160, 128, ChromaSubsampling::Chroma420, dec_precision).unwrap();
        encoder.encode(&frame, 1 << 20).unwrap();
        for packet in encoder.packetize(1400).iter() {
            decoder.push_packet(packet).unwrap();
        }
        let mut out = Frame::new(160, 128, ChromaSubsampling::Chroma420).unwrap();
        assert!(decoder.decode(&mut out, false).unwrap());
        let psnr = luma_psnr(&frame, &out);
        assert!(psnr > 30.0, "psnr {psnr} with {enc_precision:?}/{dec_precision:?}");
    }
}

#[test]
fn tiny_and_odd_dimensions_round_trip() {
    for (w, h, chroma) in [
        (64usize, 64usize, ChromaSubsampling::Chroma420),
        (100, 60, ChromaSubsampling::Chroma420),
        (33, 47, ChromaSubsampling::Chroma444),
        (1000, 1000, ChromaSubsampling::Chroma420),
    ] {
        let frame = make_test_frame(w, h, chroma, 5);
        let mut encoder = Encoder::new(w, h, chroma, Precision::Fp32).unwrap();
        let mut decoder = Decoder::new(w, h, chroma, Precision::Fp32).unwrap();
        encoder.encode(&frame, 4 << 20).unwrap();
        for packet in encoder.packetize(1400).iter() {
            decoder.push_packet(packet).unwrap();
        }
        let mut out = Frame::new(w, h, chroma).unwrap();
        assert!(decoder.decode(&mut out, false).unwrap());
        let psnr = luma_psnr(&frame, &out);
        assert!(psnr > 32.0, "{w}x{h}: psnr {psnr}");
    }
}
