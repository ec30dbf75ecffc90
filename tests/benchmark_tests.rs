//! Performance benchmarks for the codec and reassembly paths

use client::Reassembler;
use rand::seq::SliceRandom;
use server::ServerProfile;
use shared::{rules, split_packet, PlayerEntry, ServerInfo};
use std::time::{Duration, Instant};

/// Benchmarks info response decoding
#[test]
fn benchmark_info_decode() {
    let message = ServerProfile::default().info.encode_response();

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = ServerInfo::decode(&message[1..]).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Info decode: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_secs() < 5);
}

/// Benchmarks a full 255-entry player list
#[test]
fn benchmark_large_player_list() {
    let players: Vec<PlayerEntry> = (0..=254u8)
        .map(|index| PlayerEntry {
            index,
            name: format!("somebody with a long name {}", index),
            score: index as i32,
            duration: index as f32 * 10.0,
        })
        .collect();
    let message = PlayerEntry::encode_list_response(&players);

    let iterations = 2_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let decoded = PlayerEntry::decode_list(&message[1..]).unwrap();
        assert_eq!(decoded.len(), 255);
    }

    let duration = start.elapsed();
    println!(
        "Player list decode: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_secs() < 5);
}

/// Benchmarks reassembly of shuffled split rules responses
#[test]
fn benchmark_shuffled_reassembly() {
    let pairs: Vec<(String, String)> = (0..500)
        .map(|i| (format!("sv_rule_{}", i), format!("{}", i * 31)))
        .collect();
    let message = rules::encode_response(pairs.iter().map(|(n, v)| (n.as_str(), v.as_str())));

    let mut rng = rand::thread_rng();
    let mut reassembler = Reassembler::new(Duration::from_secs(1));
    let now = tokio::time::Instant::now();

    let iterations = 1_000u32;
    let start = Instant::now();

    for id in 0..iterations {
        let mut fragments = split_packet(&message, id, 1200).unwrap();
        fragments.shuffle(&mut rng);

        let mut completed = None;
        for fragment in &fragments {
            if let Some(done) = reassembler.push(fragment, now) {
                completed = Some(done);
            }
        }
        assert_eq!(completed.unwrap().payload, message);
    }

    let duration = start.elapsed();
    println!(
        "Shuffled reassembly: {} responses of {} bytes in {:?} ({:.2} μs/response)",
        iterations,
        message.len(),
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(reassembler.pending(), 0);
    assert!(duration.as_secs() < 10);
}

/// Stress test: many interleaved answers in flight at once
#[test]
fn stress_test_interleaved_answers() {
    let message = ServerProfile::default().info.encode_response();
    let now = tokio::time::Instant::now();
    let mut reassembler = Reassembler::new(Duration::from_secs(1));

    let mut all: Vec<Vec<u8>> = (0..200u32)
        .flat_map(|id| split_packet(&message, id, 16).unwrap())
        .collect();
    all.shuffle(&mut rand::thread_rng());

    let start = Instant::now();
    let completed = all
        .iter()
        .filter_map(|fragment| reassembler.push(fragment, now))
        .inspect(|done| assert_eq!(done.payload, message))
        .count();
    let duration = start.elapsed();

    println!(
        "Interleaved reassembly: {} fragments in {:?}",
        all.len(),
        duration
    );

    assert_eq!(completed, 200);
    assert_eq!(reassembler.pending(), 0);
}
