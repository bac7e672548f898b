use crate::*;

use assetlink_client::ClientError;
use assetlink_core::payload;
use assetlink_core::wire::{ErrorType, FileType, PacketType};

/// Collect `n` events, returning per-operation failures and the
/// `Suspended` reason.
async fn collect_teardown(
    manager: &OperationManager,
    n: usize,
) -> Result<(Vec<EventCapsule>, Option<ErrorType>)> {
    let mut failed = Vec::new();
    let mut suspended = None;
    for _ in 0..n {
        let capsule = next_event(manager).await?;
        if capsule.event == NetworkEvent::Suspended {
            assert!(suspended.is_none(), "Suspended reported twice");
            assert_eq!(capsule.operation_id, 0);
            suspended = Some(capsule.error);
        } else {
            failed.push(capsule);
        }
    }
    Ok((failed, suspended))
}

/// A peer `Suspend` fails every pending operation once and is reported once.
#[tokio::test]
async fn test_peer_suspend_fails_all_operations() -> Result<()> {
    let (listener, port) = listen().await?;
    let manager = {
        let mut m = OperationManager::new(quiet_config());
        m.connect("127.0.0.1", port, 5).await?;
        m
    };
    let mut peer = accept(&listener).await?;
    assert_eq!(next_event(&manager).await?.event, NetworkEvent::Connected);

    let mut ids = vec![
        manager.request_file("a.png", FileType::Dlc)?,
        manager.request_file("b.png", FileType::User)?,
        manager.save_user_file("c.sav", vec![7u8; 64])?,
        manager.request_id()?,
    ];
    assert_eq!(manager.count_active_operations(), ids.len());
    // FileRequest, FileRequest, FileInfo, File, IdRequest
    for _ in 0..5 {
        recv(&mut peer).await?;
    }

    send(&mut peer, &Packet::suspend(ErrorType::ManualShutdown)).await?;

    let (failed, suspended) = collect_teardown(&manager, ids.len() + 1).await?;
    assert_eq!(suspended, Some(ErrorType::ManualShutdown));
    let mut seen: Vec<u8> = failed
        .iter()
        .map(|c| {
            assert_eq!(c.error, ErrorType::SocketClosed);
            assert!(!c.is_success());
            c.operation_id
        })
        .collect();
    seen.sort_unstable();
    ids.sort_unstable();
    assert_eq!(seen, ids);

    assert!(!manager.is_active());
    assert_eq!(manager.count_active_operations(), 0);
    assert_eq!(manager.count_pending_events(), 0);
    assert!(matches!(
        manager.request_file("a.png", FileType::Dlc),
        Err(ClientError::NotActive)
    ));
    Ok(())
}

/// No traffic within the grace period trips the watchdog.
#[tokio::test]
async fn test_silent_server_trips_grace_timer() -> Result<()> {
    let (listener, port) = listen().await?;
    let mut config = ClientConfig::default();
    config.watchdog.grace_ms = 200;
    config.watchdog.recheck_ms = 100;
    let mut manager = OperationManager::new(config);
    manager.connect("127.0.0.1", port, 5).await?;
    let _peer = accept(&listener).await?;
    assert_eq!(next_event(&manager).await?.event, NetworkEvent::Connected);

    let id = manager.request_file("never.bin", FileType::Dlc)?;

    let (failed, suspended) = collect_teardown(&manager, 2).await?;
    assert_eq!(suspended, Some(ErrorType::ConnectionCheckFailed));
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].event, NetworkEvent::FileRequestFailed);
    assert_eq!(failed[0].error, ErrorType::SocketClosed);
    assert_eq!(failed[0].operation_id, id);
    assert!(!manager.is_active());
    Ok(())
}

/// Silence after traffic trips the recheck timer; connection checks keep
/// the connection alive and are echoed back.
#[tokio::test]
async fn test_recheck_timer_and_connection_check_echo() -> Result<()> {
    let (listener, port) = listen().await?;
    let mut config = ClientConfig::default();
    config.watchdog.grace_ms = 300;
    config.watchdog.recheck_ms = 300;
    let mut manager = OperationManager::new(config);
    manager.connect("127.0.0.1", port, 5).await?;
    let mut peer = accept(&listener).await?;
    assert_eq!(next_event(&manager).await?.event, NetworkEvent::Connected);

    // Keep-alive well past both intervals.
    for seq in 0..6u16 {
        let check = Packet::new(PacketType::ConnectionCheck, 0, vec![0xCC]).with_sequence(seq);
        send(&mut peer, &check).await?;
        let echo = recv(&mut peer).await?;
        assert!(echo.is(PacketType::ConnectionCheck));
        assert_eq!(echo.sequence, seq);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(manager.is_active());
    assert_eq!(manager.count_pending_events(), 0);

    let suspended = event_of(&manager, NetworkEvent::Suspended).await?;
    assert_eq!(suspended.error, ErrorType::ConnectionCheckFailed);
    assert!(!manager.is_active());
    Ok(())
}

/// The server hanging up is a `SocketClosed` teardown.
#[tokio::test]
async fn test_server_disconnect_is_socket_closed() -> Result<()> {
    let (listener, port) = listen().await?;
    let mut manager = OperationManager::new(quiet_config());
    manager.connect("127.0.0.1", port, 5).await?;
    let mut peer = accept(&listener).await?;
    assert_eq!(next_event(&manager).await?.event, NetworkEvent::Connected);

    let id = manager.save_user_file("x.sav", vec![1, 2, 3])?;
    recv(&mut peer).await?;
    recv(&mut peer).await?;
    drop(peer);

    let (failed, suspended) = collect_teardown(&manager, 2).await?;
    assert_eq!(suspended, Some(ErrorType::SocketClosed));
    assert_eq!(failed[0].event, NetworkEvent::FileSaveFailed);
    assert_eq!(failed[0].operation_id, id);
    assert_eq!(failed[0].error, ErrorType::SocketClosed);
    Ok(())
}

/// Manual shutdown fails pending work, closes the socket, and the manager
/// can connect again afterwards.
#[tokio::test]
async fn test_manual_shutdown_and_reconnect() -> Result<()> {
    let (listener, port) = listen().await?;
    let mut manager = OperationManager::new(quiet_config());
    manager.connect("127.0.0.1", port, 5).await?;
    let mut peer = accept(&listener).await?;
    assert_eq!(next_event(&manager).await?.event, NetworkEvent::Connected);

    let id = manager.request_file("slow.bin", FileType::Dlc)?;
    recv(&mut peer).await?;

    manager.shutdown()?;
    assert!(!manager.is_active());
    assert!(matches!(manager.shutdown(), Err(ClientError::NotActive)));

    let (failed, suspended) = collect_teardown(&manager, 2).await?;
    assert_eq!(suspended, Some(ErrorType::ManualShutdown));
    assert_eq!(failed[0].operation_id, id);
    assert_eq!(failed[0].error, ErrorType::SocketClosed);

    // The client side of the socket is gone.
    assert!(recv(&mut peer).await.is_err());

    manager.connect("127.0.0.1", port, 5).await?;
    let mut peer = accept(&listener).await?;
    assert_eq!(next_event(&manager).await?.event, NetworkEvent::Connected);
    manager.request_id()?;
    let request = recv(&mut peer).await?;
    send(
        &mut peer,
        &Packet::new(PacketType::Id, request.operation_id, payload::encode_id(77)),
    )
    .await?;
    let done = event_of(&manager, NetworkEvent::IdRequestDone).await?;
    assert_eq!(done.user_id, 77);
    assert_eq!(manager.user_id(), 77);
    Ok(())
}
