use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use pairing_protocol::{PairingConfig, Role, SessionState, Tag, encode_frame};
use pairing_transport::{Link, LinkEvent, MemoryLink};
use secure_pairing::{
    ChannelPinSource, FixedPin, NoPin, PairingDriver, PairingError, Pin, Session, SessionBuilder,
    SessionEvent,
};

fn central() -> Session {
    SessionBuilder::new(Role::Central).build().unwrap()
}

fn peripheral(pin: &str) -> Session {
    SessionBuilder::new(Role::Peripheral)
        .pin(Pin::new(pin).unwrap())
        .build()
        .unwrap()
}

fn fixed(pin: &str) -> FixedPin {
    FixedPin::new(Pin::new(pin).unwrap())
}

fn transmitted(events: Vec<SessionEvent>) -> Vec<Bytes> {
    events
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::Transmit(data) => Some(data),
            _ => None,
        })
        .collect()
}

async fn next_data(link: &mut MemoryLink) -> Bytes {
    match link.recv().await {
        LinkEvent::Data(data) => data,
        LinkEvent::Disconnected => panic!("link closed unexpectedly"),
    }
}

#[tokio::test]
async fn test_pairing_over_memory_link() {
    let (central_link, peripheral_link) = MemoryLink::pair();
    let (sender, source) = ChannelPinSource::new();
    let sender = Mutex::new(Some(sender));

    // The operator reads the displayed PIN and types it on the central
    let peripheral_driver =
        PairingDriver::new(peripheral("602214"), peripheral_link, NoPin).on_pin(move |pin| {
            if let Some(sender) = sender.lock().unwrap().take() {
                let _ = sender.send(pin.clone());
            }
        });
    let peripheral_task = tokio::spawn(peripheral_driver.run());

    let mut central_link = PairingDriver::new(central(), central_link, source)
        .run()
        .await
        .unwrap();
    let mut peripheral_link = peripheral_task.await.unwrap().unwrap();

    assert_eq!(central_link.session().state(), SessionState::Secure);
    assert_eq!(peripheral_link.session().state(), SessionState::Secure);

    central_link.send(b"open door").await.unwrap();
    assert_eq!(peripheral_link.recv().await.unwrap(), &b"open door"[..]);

    peripheral_link.send(b"door open").await.unwrap();
    assert_eq!(central_link.recv().await.unwrap(), &b"door open"[..]);
}

#[tokio::test]
async fn test_wrong_pin_fails_both_sides() {
    let (central_link, peripheral_link) = MemoryLink::pair();

    let peripheral_task =
        tokio::spawn(PairingDriver::new(peripheral("123456"), peripheral_link, NoPin).run());
    let central_result = PairingDriver::new(central(), central_link, fixed("654321"))
        .run()
        .await;
    let peripheral_result = peripheral_task.await.unwrap();

    assert!(matches!(
        peripheral_result,
        Err(PairingError::ConfirmationMismatch)
    ));
    assert!(matches!(
        central_result,
        Err(PairingError::TransportDisconnected)
    ));
}

#[tokio::test]
async fn test_short_peer_key_closes_link_without_reply() {
    let (central_link, mut raw) = MemoryLink::pair();
    let task = tokio::spawn(PairingDriver::new(central(), central_link, fixed("1234")).run());

    raw.send(encode_frame(Tag::KeyExchange, &[7u8; 16]).unwrap())
        .await
        .unwrap();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(PairingError::InvalidPeerKey(_))));
    assert_eq!(raw.recv().await, LinkEvent::Disconnected);
}

#[tokio::test]
async fn test_disconnect_cancels_pin_prompt() {
    let (central_link, mut raw) = MemoryLink::pair();
    let (sender, source) = ChannelPinSource::new();
    let task = tokio::spawn(PairingDriver::new(central(), central_link, source).run());

    let mut device = peripheral("1234");
    for data in transmitted(device.connect().unwrap()) {
        raw.send(data).await.unwrap();
    }

    // The key reply means the central is now prompting for the PIN
    let reply = next_data(&mut raw).await;
    assert_eq!(reply[4], Tag::KeyExchange.to_byte());
    raw.close();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(PairingError::TransportDisconnected)));
    assert!(sender.is_cancelled());
}

#[tokio::test]
async fn test_failed_pin_prompt_aborts_pairing() {
    let (central_link, mut raw) = MemoryLink::pair();
    let task = tokio::spawn(PairingDriver::new(central(), central_link, NoPin).run());

    let mut device = peripheral("1234");
    for data in transmitted(device.connect().unwrap()) {
        raw.send(data).await.unwrap();
    }
    next_data(&mut raw).await;

    let result = task.await.unwrap();
    assert!(matches!(result, Err(PairingError::PinEntryAborted(_))));
    assert_eq!(raw.recv().await, LinkEvent::Disconnected);
}

#[tokio::test]
async fn test_flood_during_pin_entry_fails_session() {
    let (central_link, mut raw) = MemoryLink::pair();
    let (sender, source) = ChannelPinSource::new();
    let task = tokio::spawn(PairingDriver::new(central(), central_link, source).run());

    let mut device = peripheral("1234");
    for data in transmitted(device.connect().unwrap()) {
        raw.send(data).await.unwrap();
    }
    next_data(&mut raw).await;

    // Default limit of 3 buffers four frames and gives up on the fifth
    let junk = encode_frame(Tag::Application, &[0x55; 400]).unwrap();
    for _ in 0..5 {
        raw.send(junk.clone()).await.unwrap();
    }

    let result = task.await.unwrap();
    assert!(matches!(
        result,
        Err(PairingError::TooManyUnexpectedFrames { count: 5 })
    ));
    assert!(sender.is_cancelled());
    assert_eq!(raw.recv().await, LinkEvent::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_handshake_times_out_without_peer() {
    let (central_link, _raw) = MemoryLink::pair();
    let start = tokio::time::Instant::now();

    let result = PairingDriver::new(central(), central_link, fixed("1234"))
        .run()
        .await;

    assert!(matches!(
        result,
        Err(PairingError::HandshakeTimeout {
            state: SessionState::WaitingPeerKey
        })
    ));
    assert!(start.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_pin_prompt_times_out() {
    let (central_link, mut raw) = MemoryLink::pair();
    let (_sender, source) = ChannelPinSource::new();
    let start = tokio::time::Instant::now();
    let task = tokio::spawn(PairingDriver::new(central(), central_link, source).run());

    let mut device = peripheral("1234");
    for data in transmitted(device.connect().unwrap()) {
        raw.send(data).await.unwrap();
    }
    next_data(&mut raw).await;

    let result = task.await.unwrap();
    assert!(matches!(
        result,
        Err(PairingError::HandshakeTimeout {
            state: SessionState::KeyExchanged
        })
    ));
    assert!(start.elapsed() >= Duration::from_secs(120));
}

#[tokio::test]
async fn test_frames_during_pin_entry_are_replayed_after_it() {
    let (central_link, mut raw) = MemoryLink::pair();
    let (sender, source) = ChannelPinSource::new();
    let task = tokio::spawn(PairingDriver::new(central(), central_link, source).run());

    let mut device = peripheral("1234");
    for data in transmitted(device.connect().unwrap()) {
        raw.send(data).await.unwrap();
    }
    next_data(&mut raw).await;

    // Arrives while the operator is still typing; only valid once the PIN is applied
    raw.send(encode_frame(Tag::Confirmation, &[0u8; 32]).unwrap())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    sender.send(Pin::new("1234").unwrap()).unwrap();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(PairingError::ConfirmationMismatch)));
}

#[tokio::test]
async fn test_stray_frame_tolerated_and_replay_dropped() {
    let (central_link, mut raw) = MemoryLink::pair();
    let config = PairingConfig {
        max_unexpected_frames: 2,
        ..PairingConfig::default()
    };
    let session = SessionBuilder::new(Role::Central)
        .config(config)
        .build()
        .unwrap();
    let task = tokio::spawn(PairingDriver::new(session, central_link, fixed("424242")).run());

    let mut device = peripheral("424242");
    raw.send(encode_frame(Tag::Application, b"stray").unwrap())
        .await
        .unwrap();
    for data in transmitted(device.connect().unwrap()) {
        raw.send(data).await.unwrap();
    }

    let key = next_data(&mut raw).await;
    assert!(device.receive(&key).unwrap().is_empty());

    let confirmation = next_data(&mut raw).await;
    for data in transmitted(device.receive(&confirmation).unwrap()) {
        raw.send(data).await.unwrap();
    }
    assert_eq!(device.state(), SessionState::Secure);

    let mut link = task.await.unwrap().unwrap();
    assert_eq!(link.session().unexpected_frames(), 1);

    let first = device.seal(b"a").unwrap();
    let second = device.seal(b"b").unwrap();
    raw.send(first.clone()).await.unwrap();
    raw.send(first).await.unwrap();
    raw.send(second).await.unwrap();

    assert_eq!(link.recv().await.unwrap(), &b"a"[..]);
    assert_eq!(link.recv().await.unwrap(), &b"b"[..]);
    assert_eq!(link.session().state(), SessionState::Secure);

    link.send(b"ack").await.unwrap();
    let sealed = next_data(&mut raw).await;
    match device.receive(&sealed).unwrap().pop() {
        Some(SessionEvent::Message(message)) => assert_eq!(message, &b"ack"[..]),
        other => panic!("expected a message, got {:?}", other),
    }

    raw.close();
    assert!(matches!(
        link.recv().await,
        Err(PairingError::TransportDisconnected)
    ));
    assert_eq!(link.session().state(), SessionState::Failed);
    assert!(!link.session().holds_key_material());
}

#[tokio::test]
async fn test_oversized_message_rejected_before_sealing() {
    let (central_link, peripheral_link) = MemoryLink::pair();
    let peripheral_task =
        tokio::spawn(PairingDriver::new(peripheral("1111"), peripheral_link, NoPin).run());
    let mut link = PairingDriver::new(central(), central_link, fixed("1111"))
        .run()
        .await
        .unwrap();
    let mut peer = peripheral_task.await.unwrap().unwrap();

    let big = vec![0u8; secure_pairing::MAX_MESSAGE_SIZE + 1];
    assert!(matches!(
        link.send(&big).await,
        Err(PairingError::MessageTooLarge { .. })
    ));

    let largest = vec![0xA5; secure_pairing::MAX_MESSAGE_SIZE];
    link.send(&largest).await.unwrap();
    assert_eq!(peer.recv().await.unwrap(), &largest[..]);
}
