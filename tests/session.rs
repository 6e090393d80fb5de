use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use speaker_bulb::*;
use tokio::sync::mpsc;
use tokio::time::timeout;

const LIGHT_STATUS: [u8; 15] = [
    0x55, 0xaa, 0x09, 0x88, 0x15, 0x00, 0x00, 0x00, 0x75, 0x8a, 0x8d, 0x01, 0x00, 0x50, 0x7d,
];

fn session_with(config: SessionConfig) -> (Arc<FakeTransport>, Session) {
    let fake = Arc::new(FakeTransport::new());
    let session = Session::new(fake.clone(), config);
    (fake, session)
}

fn power_on_frame() -> Vec<u8> {
    encode(Category::Light, 0x05, 0x01u8).unwrap()
}

#[tokio::test]
async fn connect_gives_up_after_exactly_max_attempts() {
    let (fake, session) = session_with(SessionConfig::default());
    fake.fail_connects(10);

    let result = session.connect(4).await;

    assert_matches!(result, Err(Error::TransportUnavailable(4)));
    assert_eq!(4, fake.connect_attempts());
    assert_eq!(ConnectionState::Disconnected, session.state());
}

#[tokio::test]
async fn connect_survives_transient_failures() -> Result<()> {
    let (fake, session) = session_with(SessionConfig::default());
    fake.fail_connects(2);

    session.connect(3).await?;

    assert_eq!(3, fake.connect_attempts());
    assert_eq!(ConnectionState::Connected, session.state());
    Ok(())
}

#[tokio::test]
async fn send_command_reconnects_after_link_drop() -> Result<()> {
    let (fake, session) = session_with(SessionConfig::default());
    session.connect(1).await?;

    fake.drop_link();
    assert_eq!(ConnectionState::Disconnected, session.state());

    assert!(session.send_command(&power_on_frame()).await?);
    assert_eq!(2, fake.connect_attempts());
    assert_eq!(ConnectionState::Connected, session.state());
    assert_eq!(vec![power_on_frame()], fake.written());
    Ok(())
}

#[tokio::test]
async fn implicit_reconnect_is_bounded_by_retries() -> Result<()> {
    let (fake, session) = session_with(SessionConfig::default().with_retries(2));
    session.connect(1).await?;
    fake.drop_link();
    fake.fail_connects(10);

    let result = session.send_command(&power_on_frame()).await;

    assert_matches!(result, Err(Error::TransportUnavailable(2)));
    assert_eq!(3, fake.connect_attempts());
    assert!(fake.written().is_empty());
    Ok(())
}

#[tokio::test]
async fn only_acknowledged_writes_succeed() -> Result<()> {
    let (fake, session) = session_with(SessionConfig::default());
    session.connect(1).await?;

    fake.push_write_reply(WriteReply::Unacknowledged(vec![0x00]));
    assert!(!session.send_command(&power_on_frame()).await?);

    fake.fail_next_write();
    assert!(!session.send_command(&power_on_frame()).await?);

    assert!(session.send_command(&power_on_frame()).await?);
    Ok(())
}

#[tokio::test]
async fn empty_read_is_no_data() -> Result<()> {
    let (fake, session) = session_with(SessionConfig::default());
    session.connect(1).await?;

    assert_eq!(None, session.read_status().await?);

    fake.push_read(LIGHT_STATUS);
    assert_eq!(Some(LIGHT_STATUS.to_vec()), session.read_status().await?);
    Ok(())
}

#[tokio::test]
async fn batch_is_discarded_when_any_exchange_fails() -> Result<()> {
    let (fake, session) = session_with(SessionConfig::default());
    session.connect(1).await?;
    let frames = vec![
        Query::SpeakerVolume.frame()?,
        Query::SpeakerEqualizer.frame()?,
    ];

    // second read comes back empty
    fake.push_read(vec![0x55, 0xaa, 0x01, 0x84, 0x04, 0x10, 0x00]);
    assert_eq!(None, session.request_batch(&frames).await?);

    fake.push_read(vec![0x01]);
    fake.push_read(vec![0x02]);
    assert_eq!(
        Some(vec![vec![0x01], vec![0x02]]),
        session.request_batch(&frames).await?
    );
    assert_eq!(4, fake.written().len());
    Ok(())
}

#[tokio::test]
async fn failed_liveness_check_closes_the_link() -> Result<()> {
    let (fake, session) = session_with(SessionConfig::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.on_status(move |status| {
        let _ = tx.send(status.clone());
    });
    session.connect(1).await?;
    assert!(session.test_liveness().await);
    let generation = session.generation();

    fake.fail_name_reads(1);
    assert!(!session.test_liveness().await);
    assert_eq!(ConnectionState::Disconnected, session.state());
    assert!(session.generation() > generation);
    assert!(!fake.is_connected().await);

    fake.notify(LIGHT_STATUS);
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());

    fake.fire_disconnect(0);
    assert_eq!(ConnectionState::Disconnected, session.state());
    Ok(())
}

#[tokio::test]
async fn device_name_drops_trailing_nuls() -> Result<()> {
    let (fake, session) = session_with(SessionConfig::default());
    fake.set_device_name(b"SPEAKER-BULB\0\0".to_vec());

    assert_eq!(Some("SPEAKER-BULB".to_string()), session.device_name().await?);
    Ok(())
}

#[tokio::test]
async fn notifications_reach_every_observer() -> Result<()> {
    let (fake, session) = session_with(SessionConfig::default());
    let (first_tx, mut first_rx) = mpsc::unbounded_channel();
    let (second_tx, mut second_rx) = mpsc::unbounded_channel();
    session.on_status(move |status| {
        let _ = first_tx.send(status.clone());
    });
    session.on_status(move |status| {
        let _ = second_tx.send(status.clone());
    });
    session.connect(1).await?;

    fake.notify(LIGHT_STATUS);

    for rx in [&mut first_rx, &mut second_rx] {
        let status = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_matches!(status, Some(Status::Light(light)) if light.brightness == 0x8d);
    }
    Ok(())
}

#[tokio::test]
async fn callbacks_of_old_connections_are_ignored() -> Result<()> {
    let (fake, session) = session_with(SessionConfig::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.on_status(move |status| {
        let _ = tx.send(status.clone());
    });

    session.connect(1).await?;
    let first = session.generation();
    fake.drop_link();
    session.connect(1).await?;
    assert!(session.generation() > first);

    fake.fire_disconnect(0);
    assert_eq!(ConnectionState::Connected, session.state());

    fake.notify_via(0, LIGHT_STATUS);
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());

    fake.notify_via(1, LIGHT_STATUS);
    let status = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
    assert_matches!(status, Some(Status::Light(_)));
    Ok(())
}

#[tokio::test]
async fn disconnect_makes_callbacks_stale() -> Result<()> {
    let (fake, session) = session_with(SessionConfig::default());
    session.connect(1).await?;

    session.disconnect().await?;
    assert_eq!(ConnectionState::Disconnected, session.state());
    assert!(!fake.is_connected().await);

    fake.fire_disconnect(0);
    assert_eq!(ConnectionState::Disconnected, session.state());
    Ok(())
}

#[tokio::test]
async fn notification_during_request_leaves_the_exchange_intact() -> Result<()> {
    let (fake, session) = session_with(SessionConfig::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.on_status(move |status| {
        let _ = tx.send(status.clone());
    });
    session.connect(1).await?;

    let volume_reply = vec![0x55, 0xaa, 0x01, 0x84, 0x04, 0x10, 0x57];
    fake.notify_after_next_write(LIGHT_STATUS);
    fake.push_read(volume_reply.clone());

    let reply = session.request(&Query::SpeakerVolume.frame()?).await?;

    assert_eq!(Some(volume_reply), reply);
    assert_eq!(vec![Query::SpeakerVolume.frame()?], fake.written());
    let status = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
    assert_matches!(status, Some(Status::Light(light)) if light.brightness == 0x8d);
    Ok(())
}
