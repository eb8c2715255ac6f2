use tonelink_core::{
    DetectorState, FrameDetector, FrequencyWindow, LinkError, ProtocolConfig, StopSignal,
};

const WINDOW_S: f32 = 0.01;

fn new_detector(config: &ProtocolConfig) -> FrameDetector {
    let _ = env_logger::builder().is_test(true).try_init();
    FrameDetector::new(config)
}

fn tone(frequency_hz: f32, seconds: f32) -> Vec<FrequencyWindow> {
    let count = (seconds / WINDOW_S).round() as usize;
    vec![FrequencyWindow::tone(frequency_hz, WINDOW_S); count]
}

fn silence(seconds: f32) -> Vec<FrequencyWindow> {
    let count = (seconds / WINDOW_S).round() as usize;
    vec![FrequencyWindow::silence(WINDOW_S); count]
}

/// Length field and data bits in binary mode for a fixed 12-bit block
fn binary_body(bits: &[u8]) -> Vec<FrequencyWindow> {
    let mut windows = Vec::new();
    let len = bits.len();
    let length_bits: Vec<u8> = (0..8).rev().map(|s| ((len >> s) & 1) as u8).collect();
    for &bit in length_bits.iter().chain(bits.iter()) {
        windows.extend(tone(if bit == 1 { 6000.0 } else { 4000.0 }, 0.3));
    }
    windows
}

const BLOCK: [u8; 12] = [1, 0, 0, 0, 0, 0, 0, 0, 1, 1, 0, 1];

/// Index into `binary_body(&BLOCK)` of window `window` inside data bit `bit`
fn data_window(bit: usize, window: usize) -> usize {
    (8 + bit) * 30 + window
}

#[test]
fn test_preamble_with_exact_timing_locks() {
    let config = ProtocolConfig::default();
    let mut stream = silence(0.3);
    stream.extend(tone(8000.0, 0.12));
    stream.extend(binary_body(&BLOCK));

    let mut detector = new_detector(&config);
    let received = detector.run(stream, &StopSignal::new()).unwrap();
    assert_eq!(received, BLOCK.to_vec());
}

#[test]
fn test_preamble_within_timing_tolerance_locks() {
    let config = ProtocolConfig::default();
    for marker_s in [0.10, 0.14] {
        let mut stream = tone(8000.0, marker_s);
        stream.extend(binary_body(&BLOCK));

        let mut detector = new_detector(&config);
        assert_eq!(
            detector.run(stream, &StopSignal::new()).unwrap(),
            BLOCK.to_vec(),
            "marker of {}s",
            marker_s
        );
    }
}

#[test]
fn test_long_marker_is_not_a_preamble() {
    let config = ProtocolConfig {
        sync_timeout_s: 10.0,
        ..ProtocolConfig::default()
    };
    // A data-length marker tone (0.3 s) followed by a perfectly good body
    let mut stream = tone(8000.0, 0.3);
    stream.extend(binary_body(&BLOCK));

    let mut detector = new_detector(&config);
    for window in stream {
        assert_eq!(detector.push(window).unwrap(), DetectorState::AwaitingPreamble);
    }
    assert!(matches!(detector.finish(), Err(LinkError::SyncTimeout)));
}

#[test]
fn test_long_marker_eventually_times_out() {
    let config = ProtocolConfig {
        sync_timeout_s: 3.0,
        ..ProtocolConfig::default()
    };
    let mut stream = tone(8000.0, 0.3);
    stream.extend(silence(5.0));

    let mut detector = new_detector(&config);
    assert!(matches!(
        detector.run(stream, &StopSignal::new()),
        Err(LinkError::SyncTimeout)
    ));
}

#[test]
fn test_lock_after_false_start() {
    let config = ProtocolConfig::default();
    let mut stream = tone(8000.0, 0.3);
    stream.extend(silence(0.5));
    stream.extend(tone(8000.0, 0.12));
    stream.extend(binary_body(&BLOCK));

    let mut detector = new_detector(&config);
    assert_eq!(detector.run(stream, &StopSignal::new()).unwrap(), BLOCK.to_vec());
}

#[test]
fn test_gap_inside_preamble_breaks_the_run() {
    let config = ProtocolConfig {
        sync_timeout_s: 12.0,
        ..ProtocolConfig::default()
    };
    // Two 0.06 s halves separated by silence: neither matches 0.12 s
    let mut stream = tone(8000.0, 0.06);
    stream.extend(silence(0.05));
    stream.extend(tone(8000.0, 0.06));
    stream.extend(binary_body(&BLOCK));

    let mut detector = new_detector(&config);
    assert!(matches!(
        detector.run(stream, &StopSignal::new()),
        Err(LinkError::SyncTimeout)
    ));
}

#[test]
fn test_noisy_frequency_estimates_still_decode() {
    let config = ProtocolConfig::default();
    let mut stream = tone(8030.0, 0.12);
    // Estimates wander within +-90 Hz of the carriers
    for (i, window) in binary_body(&BLOCK).into_iter().enumerate() {
        let jitter = [-90.0, -40.0, 0.0, 35.0, 90.0][i % 5];
        stream.push(FrequencyWindow::tone(window.frequency_hz.unwrap() + jitter, WINDOW_S));
    }

    let mut detector = new_detector(&config);
    assert_eq!(detector.run(stream, &StopSignal::new()).unwrap(), BLOCK.to_vec());
}

#[test]
fn test_dropout_near_the_end_of_a_unit_is_absorbed() {
    let config = ProtocolConfig::default();
    let mut stream = tone(8000.0, 0.12);
    let mut body = binary_body(&BLOCK);
    // Window 28 of the first length bit and of the first data bit
    for idx in [28, 8 * 30 + 28] {
        body[idx] = FrequencyWindow::tone(5000.0, WINDOW_S);
    }
    stream.extend(body);

    let mut detector = new_detector(&config);
    assert_eq!(detector.run(stream, &StopSignal::new()).unwrap(), BLOCK.to_vec());
}

#[test]
fn test_cancel_from_another_thread() {
    let config = ProtocolConfig::default();
    let stop = StopSignal::new();
    let remote = stop.clone();
    std::thread::spawn(move || remote.cancel())
        .join()
        .expect("Failed to join cancelling thread");

    let mut stream = tone(8000.0, 0.12);
    stream.extend(binary_body(&BLOCK));

    let mut detector = new_detector(&config);
    assert!(matches!(detector.run(stream, &stop), Err(LinkError::SyncTimeout)));
    assert_eq!(detector.state(), DetectorState::AwaitingPreamble);
}

#[test]
fn test_gap_in_the_middle_of_a_bit_is_absorbed() {
    let config = ProtocolConfig::default();
    let mut stream = tone(8000.0, 0.12);
    let mut body = binary_body(&BLOCK);
    body[data_window(4, 15)] = FrequencyWindow::silence(WINDOW_S);
    // Also inside the length field
    body[45] = FrequencyWindow::silence(WINDOW_S);
    stream.extend(body);

    let mut detector = new_detector(&config);
    assert_eq!(detector.run(stream, &StopSignal::new()).unwrap(), BLOCK.to_vec());
}

#[test]
fn test_wrong_bit_in_the_middle_of_a_bit_is_outvoted() {
    let config = ProtocolConfig::default();
    let mut stream = tone(8000.0, 0.12);
    let mut body = binary_body(&BLOCK);
    // Data bit 2 is a zero; three windows read as a one
    for offset in 14..17 {
        body[data_window(2, offset)] = FrequencyWindow::tone(6000.0, WINDOW_S);
    }
    // Data bit 9 is a one; one window reads as a zero
    body[data_window(9, 15)] = FrequencyWindow::tone(4000.0, WINDOW_S);
    stream.extend(body);

    let mut detector = new_detector(&config);
    assert_eq!(detector.run(stream, &StopSignal::new()).unwrap(), BLOCK.to_vec());
}

#[test]
fn test_grouped_symbol_glitch_is_outvoted() {
    let config = ProtocolConfig::grouped();
    // Length 12 = symbols 0x0, 0xc; data 0x8, 0x0, 0xd
    let mut stream = tone(8000.0, 0.12);
    for symbol in [0x0u8, 0xc, 0x8, 0x0, 0xd] {
        let mut unit = tone(config.symbol_frequency(symbol), 0.3);
        unit[15] = FrequencyWindow::tone(config.symbol_frequency(0xf), WINDOW_S);
        unit[16] = FrequencyWindow::silence(WINDOW_S);
        stream.extend(unit);
    }

    let mut detector = new_detector(&config);
    assert_eq!(detector.run(stream, &StopSignal::new()).unwrap(), BLOCK.to_vec());
}

#[test]
fn test_carrier_lost_mid_frame_is_insufficient_data() {
    let config = ProtocolConfig::default();
    let mut stream = tone(8000.0, 0.12);
    let mut body = binary_body(&BLOCK);
    for offset in 0..20 {
        body[data_window(5, offset)] = FrequencyWindow::silence(WINDOW_S);
    }
    stream.extend(body);

    let mut detector = new_detector(&config);
    assert!(matches!(
        detector.run(stream, &StopSignal::new()),
        Err(LinkError::InsufficientData)
    ));
}

#[test]
fn test_cancel_while_reading_data() {
    let config = ProtocolConfig::default();
    let mut stream = tone(8000.0, 0.12);
    stream.extend(binary_body(&BLOCK));

    let mut detector = new_detector(&config);
    // Preamble, length field and the first data bit
    let split = 12 + data_window(1, 0);
    for window in &stream[..split] {
        detector.push(*window).unwrap();
    }
    assert_eq!(detector.state(), DetectorState::ReadingData);
    assert_eq!(detector.declared_len(), Some(12));

    let stop = StopSignal::new();
    stop.clone().cancel();
    assert!(matches!(
        detector.run(stream[split..].to_vec(), &stop),
        Err(LinkError::SyncTimeout)
    ));
    assert_eq!(detector.state(), DetectorState::ReadingData);
}
