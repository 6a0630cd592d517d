use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use showspeed::runtime::{FixedTicker, Runner, SessionEvent, TestEventSource};
use showspeed::session::{ManualClock, Session, SessionConfig, SessionStatus};

// Headless integration using the runtime + Session without a TTY
#[test]
fn headless_typing_flow_completes() {
    let completions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&completions);
    let mut session = Session::with_clock(
        "hi".to_string(),
        SessionConfig::words(50),
        ManualClock::new(),
    )
    .on_complete(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let (tx, rx) = mpsc::channel();
    let mut runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(5)),
    );

    for c in ['h', 'i'] {
        let event = SessionEvent::from_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE));
        tx.send(event.unwrap()).unwrap();
    }

    for _ in 0..100u32 {
        match runner.step() {
            SessionEvent::Tick => {
                session.on_tick();
            }
            SessionEvent::Char(c) => {
                session.write(c);
            }
            _ => {}
        }
        if session.has_finished() {
            break;
        }
    }

    assert!(session.has_finished(), "session should finish on full input");
    let metrics = session.metrics().copied().unwrap();
    assert_eq!(metrics.correct_chars, 2);
    assert_eq!(metrics.accuracy, 100.0);

    // late input and a second finish are ignored
    session.write('x');
    assert!(!session.finish());
    assert_eq!(completions.load(Ordering::SeqCst), 1);
}

#[test]
fn headless_timed_session_finishes_by_time() {
    let mut session = Session::with_clock(
        "hello world".to_string(),
        SessionConfig::timed(3),
        ManualClock::new(),
    );

    let (_tx, rx) = mpsc::channel();
    let mut runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(5)),
    );

    // ticks before the first keystroke do not start the clock
    for _ in 0..5u32 {
        assert_eq!(runner.step(), SessionEvent::Tick);
        session.on_tick();
    }
    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(session.seconds_remaining(), Some(3));

    session.write('h');
    for _ in 0..50u32 {
        if let SessionEvent::Tick = runner.step() {
            session.on_tick();
        }
        if session.has_finished() {
            break;
        }
    }

    assert!(session.has_finished(), "timed session should finish by timeout");
    assert_eq!(session.seconds_remaining(), Some(0));
    assert_eq!(session.metrics().unwrap().wpm, 4);
}

#[test]
fn headless_pause_freezes_countdown() {
    let clock = ManualClock::new();
    let mut session =
        Session::with_clock("hello".to_string(), SessionConfig::timed(30), clock.clone());

    session.write('h');
    for _ in 0..5 {
        clock.advance_secs(1);
        session.on_tick();
    }
    assert_eq!(session.status(), SessionStatus::Paused);
    let frozen = session.seconds_remaining();

    clock.advance_secs(60);
    session.on_tick();
    assert_eq!(session.seconds_remaining(), frozen);

    session.write('e');
    assert_eq!(session.status(), SessionStatus::Active);
    clock.advance_secs(1);
    session.on_tick();
    assert_eq!(session.seconds_remaining(), frozen.map(|s| s - 1));
}

#[test]
fn restart_keeps_reference() {
    let mut session = Session::with_clock(
        "ab".to_string(),
        SessionConfig::words(50),
        ManualClock::new(),
    );
    session.write('a');
    session.write('x');
    assert!(session.has_finished());

    session.restart();
    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(session.reference(), "ab");
    assert!(session.input().is_empty());
}
