// Integration tests for the sound bus
//
// These run against the offline graph with in-memory WAV fixtures, so no
// audio device is needed. Graph time is moved forward explicitly with
// `graph_mut().advance`.

use std::cell::Cell;
use std::io::Cursor;
use std::rc::Rc;

use approx::assert_relative_eq;

use soundbus::audio_system::{
    AudioGraph, FadeRequest, MemoryLoader, OfflineGraph, SoundBus, SoundEvent, SoundId,
    SoundOptions, SoundState,
};
use soundbus::{BusConfig, Ease};

const SAMPLE_RATE: u32 = 8000;

/// Mono 16-bit WAV file of `seconds` length
fn wav(seconds: f64) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        let frames = (seconds * SAMPLE_RATE as f64) as usize;
        for i in 0..frames {
            let sample = (i as f32 * 0.07).sin() * 6000.0;
            writer.write_sample(sample as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    bytes
}

fn loader() -> MemoryLoader {
    let loader = MemoryLoader::new();
    loader.insert("one.wav", wav(1.0));
    loader.insert("two.wav", wav(2.0));
    loader
}

fn setup() -> (SoundBus<OfflineGraph>, MemoryLoader) {
    let loader = loader();
    let bus = SoundBus::new(OfflineGraph::new(), loader.clone());
    (bus, loader)
}

/// Create a sound and run a frame so its load completes
fn loaded(bus: &mut SoundBus<OfflineGraph>, options: SoundOptions) -> SoundId {
    let id = bus.create_sound(options);
    bus.update(0.0);
    assert!(bus.sound(id).unwrap().is_loaded());
    id
}

fn counter() -> Rc<Cell<u32>> {
    Rc::new(Cell::new(0))
}

fn state(bus: &SoundBus<OfflineGraph>, id: SoundId) -> Option<SoundState> {
    bus.sound(id).map(|sound| sound.state())
}

#[test]
fn test_load_then_play() {
    let (mut bus, _) = setup();
    let id = bus.create_sound(SoundOptions::new("one.wav"));
    assert_eq!(state(&bus, id), Some(SoundState::Loading));

    // Asking before the load completes plays as soon as it does
    bus.play(id);
    assert!(bus.playing_sounds().is_empty());

    bus.update(0.0);
    assert_eq!(state(&bus, id), Some(SoundState::Playing));
    assert_eq!(bus.playing_sounds(), &[id]);
    assert_relative_eq!(bus.info(id).unwrap().duration.unwrap(), 1.0, epsilon = 1e-6);
}

#[test]
fn test_volume_and_rate_bounds() {
    let (mut bus, _) = setup();
    let id = loaded(
        &mut bus,
        SoundOptions::new("one.wav")
            .with_volume(500.0)
            .with_playback_rate(0.2),
    );

    let sound = bus.sound(id).unwrap();
    assert_eq!(sound.volume(), 200.0);
    assert_eq!(sound.playback_rate(), 1.0);

    bus.set_volume(id, -999.0);
    assert_eq!(bus.sound(id).unwrap().volume(), -200.0);

    bus.play(id);
    bus.set_playback_rate(id, 50.0);
    assert_eq!(bus.sound(id).unwrap().playback_rate(), 10.0);
    let source = bus.source_node(id).unwrap();
    assert_eq!(bus.graph().playback_rate(source), Some(10.0));
}

#[test]
fn test_pause_resume_keeps_position() {
    let (mut bus, _) = setup();
    let id = loaded(&mut bus, SoundOptions::new("two.wav"));

    bus.play(id);
    bus.graph_mut().advance(0.5);
    bus.pause(id);
    assert_eq!(state(&bus, id), Some(SoundState::Paused));
    assert_eq!(bus.paused_sounds(), &[id]);
    assert_relative_eq!(bus.current_time(id), 0.5, epsilon = 1e-9);

    // Time spent paused does not count
    bus.update(0.0);
    bus.graph_mut().advance(3.0);
    assert_eq!(state(&bus, id), Some(SoundState::Paused));

    bus.resume(id);
    assert_eq!(state(&bus, id), Some(SoundState::Playing));
    assert!(bus.paused_sounds().is_empty());
    assert_relative_eq!(bus.current_time(id), 0.5, epsilon = 1e-9);

    let source = bus.source_node(id).unwrap();
    assert_relative_eq!(bus.graph().playback(source).unwrap().offset, 0.5, epsilon = 1e-9);

    bus.graph_mut().advance(0.25);
    assert_relative_eq!(bus.current_time(id), 0.75, epsilon = 1e-9);
}

#[test]
fn test_natural_end_kills_unsaved_sound() {
    let (mut bus, _) = setup();
    let id = loaded(&mut bus, SoundOptions::new("one.wav"));

    let ended = counter();
    let seen = ended.clone();
    bus.on(id, SoundEvent::End, move |_, _| seen.set(seen.get() + 1));

    bus.play(id);
    bus.graph_mut().advance(1.1);
    bus.update(16.0);

    assert_eq!(ended.get(), 1);
    assert!(!bus.is_alive(id));
    assert!(bus.playing_sounds().is_empty());
    assert_eq!(bus.recycled_count(), 1);
}

#[test]
fn test_natural_end_stops_saved_sound() {
    let (mut bus, _) = setup();
    let id = loaded(&mut bus, SoundOptions::new("one.wav").with_save(true));

    bus.play(id);
    bus.graph_mut().advance(1.1);
    bus.update(16.0);

    assert_eq!(state(&bus, id), Some(SoundState::Stopped));
    assert!(bus.playing_sounds().is_empty());
    assert!(!bus.sound(id).unwrap().is_live());

    // A saved sound can be played again
    bus.play(id);
    assert_eq!(state(&bus, id), Some(SoundState::Playing));
}

#[test]
fn test_looping_sound_replays() {
    let (mut bus, _) = setup();
    let id = loaded(&mut bus, SoundOptions::new("one.wav").with_looping(true));
    assert!(bus.sound(id).unwrap().is_saved());

    let ends = counter();
    let starts = counter();
    let (seen_end, seen_start) = (ends.clone(), starts.clone());
    bus.on(id, SoundEvent::End, move |_, _| seen_end.set(seen_end.get() + 1));
    bus.on(id, SoundEvent::Start, move |_, _| seen_start.set(seen_start.get() + 1));

    bus.play(id);
    let first = bus.source_node(id).unwrap();

    bus.graph_mut().advance(1.05);
    bus.update(16.0);

    assert_eq!(ends.get(), 1);
    assert_eq!(starts.get(), 2);
    assert_eq!(state(&bus, id), Some(SoundState::Playing));
    assert_ne!(bus.source_node(id), Some(first));
    assert_eq!(bus.graph().active_sources(), 1);
}

#[test]
fn test_kill_resets_and_invalidates_id() {
    let (mut bus, _) = setup();
    let id = loaded(&mut bus, SoundOptions::new("one.wav").with_volume(30.0));

    bus.play(id);
    bus.kill(id);

    assert!(!bus.is_alive(id));
    assert!(bus.playing_sounds().is_empty());
    assert!(bus.paused_sounds().is_empty());
    assert_eq!(bus.graph().active_sources(), 0);

    // Dead ids are inert
    bus.play(id);
    bus.set_volume(id, 80.0);
    assert!(bus.playing_sounds().is_empty());

    // The slot comes back blank under a new id
    let reused = bus.create_sound(SoundOptions::new("one.wav"));
    assert_eq!(reused.index(), id.index());
    assert_ne!(reused, id);
    assert_eq!(bus.sound(reused).unwrap().volume(), 100.0);
    assert_eq!(bus.recycled_count(), 0);
}

#[test]
fn test_recycle_pool_is_bounded() {
    let (mut bus, _) = setup();
    let mut ids = vec![loaded(&mut bus, SoundOptions::new("one.wav"))];
    for _ in 0..bus.max_recycled_sounds() {
        ids.push(bus.create_sound(SoundOptions::new("one.wav")));
    }
    assert_eq!(ids.len(), 501);

    for id in ids {
        bus.recycle_sound(id);
    }

    assert_eq!(bus.recycled_count(), 500);
    assert_eq!(bus.vacant_count(), 1);
}

#[test]
fn test_zero_duration_fade_completes_once() {
    let (mut bus, _) = setup();
    let id = loaded(&mut bus, SoundOptions::new("two.wav").with_volume(40.0));
    bus.play(id);

    let completed = counter();
    let seen = completed.clone();
    bus.fade(
        id,
        FadeRequest::new(40.0)
            .with_duration(0.0)
            .on_complete(move |_| seen.set(seen.get() + 1)),
    );
    assert_eq!(state(&bus, id), Some(SoundState::Fading));

    for frame in 0..5 {
        bus.update(frame as f64 * 16.0);
    }

    assert_eq!(completed.get(), 1);
    assert_eq!(state(&bus, id), Some(SoundState::Playing));
    assert_eq!(bus.sound(id).unwrap().volume(), 40.0);
}

#[test]
fn test_second_fade_is_ignored() {
    let (mut bus, _) = setup();
    let id = loaded(&mut bus, SoundOptions::new("two.wav"));
    bus.play(id);

    bus.fade(id, FadeRequest::new(0.0).with_duration(100.0).with_ease(Ease::Linear));
    bus.fade(id, FadeRequest::new(200.0).with_duration(10.0));

    let mut timestamp = 0.0;
    while bus.sound(id).unwrap().is_fading() && timestamp < 1_000.0 {
        bus.update(timestamp);
        timestamp += 16.0;
    }
    assert_eq!(bus.sound(id).unwrap().volume(), 0.0);
}

#[test]
fn test_unfocused_fade_is_queued() {
    let (mut bus, _) = setup();
    let id = loaded(&mut bus, SoundOptions::new("two.wav"));
    bus.play(id);

    bus.set_focused(false);
    assert_eq!(state(&bus, id), Some(SoundState::Paused));

    bus.fade(id, FadeRequest::new(0.0).with_duration(100.0));
    assert_eq!(bus.queued_to_fade(), &[id]);
    assert!(!bus.sound(id).unwrap().is_fading());

    bus.set_focused(true);
    assert_eq!(state(&bus, id), Some(SoundState::Fading));
    assert!(bus.queued_to_fade().is_empty());

    let mut timestamp = 0.0;
    while bus.sound(id).unwrap().is_fading() && timestamp < 1_000.0 {
        bus.graph_mut().advance(0.016);
        bus.update(timestamp);
        timestamp += 16.0;
    }

    assert_eq!(state(&bus, id), Some(SoundState::Playing));
    assert_eq!(bus.sound(id).unwrap().volume(), 0.0);
    let gain = bus.gain_node(id).unwrap();
    assert_eq!(bus.graph().gain_value(gain), Some(0.0));
}

#[test]
fn test_focus_loss_queues_and_spares_unfocused_sounds() {
    let (mut bus, _) = setup();
    let background = loaded(&mut bus, SoundOptions::new("two.wav").with_play_unfocused(true));
    let music = loaded(&mut bus, SoundOptions::new("two.wav"));
    let later = loaded(&mut bus, SoundOptions::new("one.wav"));

    bus.play(background);
    bus.play(music);
    bus.set_focused(false);

    assert_eq!(state(&bus, background), Some(SoundState::Playing));
    assert_eq!(state(&bus, music), Some(SoundState::Paused));

    bus.play(later);
    assert_eq!(bus.queued_to_play(), &[later]);
    assert_eq!(state(&bus, later), Some(SoundState::Unset));

    bus.set_focused(true);
    assert_eq!(state(&bus, music), Some(SoundState::Playing));
    assert_eq!(state(&bus, later), Some(SoundState::Playing));
    assert!(bus.queued_to_play().is_empty());
}

#[test]
fn test_manual_pause_survives_focus_gain() {
    let (mut bus, _) = setup();
    let id = loaded(&mut bus, SoundOptions::new("two.wav"));
    bus.play(id);
    bus.pause(id);

    bus.set_focused(false);
    bus.set_focused(true);
    assert_eq!(state(&bus, id), Some(SoundState::Paused));
}

#[test]
fn test_resume_while_unfocused_keeps_position() {
    let (mut bus, _) = setup();
    let id = loaded(&mut bus, SoundOptions::new("two.wav"));

    let starts = counter();
    let resumes = counter();
    let seen = starts.clone();
    bus.on(id, SoundEvent::Start, move |_, _| seen.set(seen.get() + 1));
    let seen = resumes.clone();
    bus.on(id, SoundEvent::Resume, move |_, _| seen.set(seen.get() + 1));

    bus.play(id);
    bus.graph_mut().advance(1.0);
    bus.set_focused(false);
    assert_eq!(state(&bus, id), Some(SoundState::Paused));

    // Asked to resume while unfocused: queued, continues once focus returns
    bus.resume(id);
    assert_eq!(bus.queued_to_play(), &[id]);
    assert_eq!(state(&bus, id), Some(SoundState::Paused));

    bus.set_focused(true);
    assert_eq!(state(&bus, id), Some(SoundState::Playing));
    assert!(bus.paused_sounds().is_empty());
    assert!(bus.queued_to_play().is_empty());
    assert_eq!(starts.get(), 1);
    assert_eq!(resumes.get(), 1);
    assert_relative_eq!(bus.current_time(id), 1.0, epsilon = 1e-9);

    let source = bus.source_node(id).unwrap();
    assert_relative_eq!(bus.graph().playback(source).unwrap().offset, 1.0, epsilon = 1e-9);
    assert_eq!(bus.graph().active_sources(), 1);
}

#[test]
fn test_stop_before_load_drops_pending_play() {
    let (mut bus, _) = setup();
    let id = bus.create_sound(SoundOptions::new("one.wav"));

    bus.play(id);
    bus.stop(id);
    bus.update(0.0);

    assert!(bus.is_alive(id));
    assert!(bus.sound(id).unwrap().is_loaded());
    assert_eq!(state(&bus, id), Some(SoundState::Unset));
    assert!(bus.playing_sounds().is_empty());
    assert_eq!(bus.graph().active_sources(), 0);

    // The suppression is one-shot: a later play goes through
    bus.play(id);
    assert_eq!(state(&bus, id), Some(SoundState::Playing));
}

#[test]
fn test_same_path_loads_share_cache() {
    let (mut bus, _) = setup();
    let a = bus.create_sound(SoundOptions::new("one.wav"));
    let b = bus.create_sound(SoundOptions::new("one.wav"));
    bus.update(0.0);

    assert_eq!(bus.cached_buffers(), 1);
    assert!(bus.sound(a).unwrap().is_loaded());
    assert!(bus.sound(b).unwrap().is_loaded());

    // Already cached: no load at all
    let c = bus.create_sound(SoundOptions::new("one.wav"));
    assert!(bus.sound(c).unwrap().is_loaded());
    assert_eq!(state(&bus, c), Some(SoundState::Unset));
}

#[test]
fn test_stop_all_sounds_with_exception() {
    let (mut bus, _) = setup();
    let a = loaded(&mut bus, SoundOptions::new("two.wav").with_save(true));
    let b = loaded(&mut bus, SoundOptions::new("two.wav").with_save(true));
    let c = loaded(&mut bus, SoundOptions::new("two.wav"));

    let stops = counter();
    let seen = stops.clone();
    bus.on(a, SoundEvent::Stop, move |_, _| seen.set(seen.get() + 1));

    bus.play(a);
    bus.play(b);
    bus.play(c);
    bus.stop_all_sounds(&[b]);

    assert_eq!(bus.playing_sounds(), &[b]);
    assert_eq!(state(&bus, a), Some(SoundState::Stopped));
    assert_eq!(stops.get(), 1);

    // Unsaved sounds are recycled once their end notification arrives
    bus.update(16.0);
    assert!(bus.is_alive(a));
    assert!(!bus.is_alive(c));
    assert_eq!(state(&bus, b), Some(SoundState::Playing));
}

#[test]
fn test_kill_all_sounds_covers_paused() {
    let (mut bus, _) = setup();
    let a = loaded(&mut bus, SoundOptions::new("two.wav"));
    let b = loaded(&mut bus, SoundOptions::new("two.wav"));
    bus.play(a);
    bus.play(b);
    bus.pause(b);

    bus.kill_all_sounds();
    assert!(!bus.is_alive(a));
    assert!(!bus.is_alive(b));
    assert!(bus.paused_sounds().is_empty());
}

#[test]
fn test_decode_failure_kills_sound() {
    let (mut bus, loader) = setup();
    loader.insert("broken.wav", b"definitely not audio".to_vec());

    let broken = bus.create_sound(SoundOptions::new("broken.wav"));
    let missing = bus.create_sound(SoundOptions::new("missing.wav"));
    bus.play(broken);
    bus.update(0.0);

    assert!(!bus.is_alive(broken));
    assert!(!bus.is_alive(missing));
    assert_eq!(bus.cached_buffers(), 0);
    assert!(bus.playing_sounds().is_empty());
}

#[test]
fn test_evicted_buffer_is_reloaded() {
    let (mut bus, _) = setup();
    let id = loaded(&mut bus, SoundOptions::new("one.wav").with_save(true));
    bus.play(id);
    bus.stop(id);
    bus.update(16.0);

    bus.unload_sound("one.wav");
    assert_eq!(bus.cached_buffers(), 0);

    bus.play(id);
    assert_eq!(state(&bus, id), Some(SoundState::Loading));

    bus.update(32.0);
    assert_eq!(state(&bus, id), Some(SoundState::Playing));
    assert_eq!(bus.cached_buffers(), 1);
}

#[test]
fn test_checker_blocks_playback() {
    let (mut bus, _) = setup();
    let id = loaded(&mut bus, SoundOptions::new("one.wav"));

    let allowed = Rc::new(Cell::new(false));
    let flag = allowed.clone();
    bus.enable_checker(move || flag.get());

    bus.play(id);
    assert!(bus.playing_sounds().is_empty());
    assert!(bus.emit("one.wav", 100.0, 0.0, None, 1.0).is_none());

    allowed.set(true);
    bus.play(id);
    assert_eq!(bus.playing_sounds(), &[id]);
}

#[test]
fn test_emit_cached_plays_immediately() {
    let (mut bus, _) = setup();
    loaded(&mut bus, SoundOptions::new("one.wav"));

    let emitted = bus.emit("one.wav", 80.0, 0.25, None, 1.0).unwrap();
    assert!(bus.is_emitting(emitted));
    assert_eq!(bus.graph().active_sources(), 1);

    bus.graph_mut().advance(0.8);
    bus.update(16.0);
    assert_eq!(bus.emitted_count(), 0);
    assert_eq!(bus.graph().active_sources(), 0);
}

#[test]
fn test_kill_emitted_before_load_suppresses_it() {
    let (mut bus, _) = setup();
    let emitted = bus.emit("two.wav", 100.0, 0.0, None, 1.0).unwrap();
    assert!(!bus.is_emitting(emitted));

    bus.kill_emitted(emitted);
    bus.update(0.0);

    assert_eq!(bus.emitted_count(), 0);
    assert_eq!(bus.graph().active_sources(), 0);
    // The decoded buffer is still cached for later use
    assert_eq!(bus.cached_buffers(), 1);
}

#[test]
fn test_callbacks_can_drive_the_bus() {
    let (mut bus, _) = setup();
    let first = loaded(&mut bus, SoundOptions::new("one.wav"));
    let second = loaded(&mut bus, SoundOptions::new("two.wav"));

    // Chain: when the first sound ends, start the second
    bus.on(first, SoundEvent::End, move |bus, _| bus.play(second));
    bus.play(first);

    bus.graph_mut().advance(1.1);
    bus.update(16.0);

    assert!(!bus.is_alive(first));
    assert_eq!(bus.playing_sounds(), &[second]);
}

#[test]
fn test_config_applies_to_bus() {
    let config = BusConfig {
        master_volume: 50.0,
        max_recycled_sounds: 1,
        ..BusConfig::default()
    };
    let mut bus = SoundBus::with_config(OfflineGraph::new(), loader(), &config);
    assert_eq!(bus.master_volume(), 50.0);
    assert_eq!(bus.graph().gain_value(bus.master_gain_node()), Some(0.5));

    let a = bus.create_sound(SoundOptions::new("one.wav"));
    let b = bus.create_sound(SoundOptions::new("one.wav"));
    bus.kill(a);
    bus.kill(b);
    assert_eq!(bus.recycled_count(), 1);

    // Destination is always the master gain's only output
    let destination = bus.graph().destination();
    assert_eq!(bus.graph().outputs(bus.master_gain_node()), vec![destination]);
}
