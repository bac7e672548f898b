use crate::infra::AssetServer;
use crate::*;

use assetlink_client::ClientError;
use assetlink_core::payload::{self, FileInfoBody, FileRequestBody};
use assetlink_core::wire::{ErrorType, FileType, PacketType, MAX_FRAGMENT_PAYLOAD};

/// Connecting without a user id yields `Connected` then `IdRequestDone`.
#[tokio::test]
async fn test_connect_assigns_user_id() -> Result<()> {
    let server = AssetServer::start(&[]).await?;
    let manager = connect(quiet_config(), server.port, 0).await?;

    let done = event_of(&manager, NetworkEvent::IdRequestDone).await?;
    assert_eq!(done.error, ErrorType::Success);
    assert_eq!(done.user_id, 1000);
    assert_eq!(manager.user_id(), 1000);

    // A second request gets the next id.
    manager.request_id()?;
    let again = event_of(&manager, NetworkEvent::IdRequestDone).await?;
    assert_eq!(again.user_id, 1001);
    assert_eq!(manager.count_active_operations(), 0);
    Ok(())
}

/// Scripted download: `FileInfo(size=10)` then one terminal 10-byte `File`.
#[tokio::test]
async fn test_request_file_from_scripted_server() -> Result<()> {
    let (listener, port) = listen().await?;
    let mut manager = OperationManager::new(quiet_config());
    manager.connect("127.0.0.1", port, 42).await?;
    let mut peer = accept(&listener).await?;
    assert_eq!(next_event(&manager).await?.event, NetworkEvent::Connected);

    let id = manager.request_file("photo.jpg", FileType::Dlc)?;
    let request = recv(&mut peer).await?;
    assert!(request.is(PacketType::FileRequest));
    assert_eq!(request.operation_id, id);
    assert_eq!(request.file_type, u8::from(FileType::Dlc));
    let body = FileRequestBody::decode(&request.payload)?;
    assert_eq!(body.user_id, 42);
    assert_eq!(body.file_name, "photo.jpg");

    let info = FileInfoBody {
        file_size: 10,
        user_id: 42,
        file_name: "photo.jpg".into(),
    };
    send(
        &mut peer,
        &Packet::new(PacketType::FileInfo, id, info.encode()?)
            .with_file_type(FileType::Dlc)
            .with_continuation(true),
    )
    .await?;
    send(
        &mut peer,
        &Packet::new(PacketType::File, id, b"0123456789".to_vec())
            .with_file_type(FileType::Dlc)
            .with_sequence(1),
    )
    .await?;

    let capsule = event_of(&manager, NetworkEvent::FileRequestDone).await?;
    assert_eq!(capsule.operation_id, id);
    let file = capsule.file.context("download carried no file")?;
    assert_eq!(&file.data[..], b"0123456789");
    assert_eq!(file.file_name, "photo.jpg");
    assert_eq!(file.file_size, 10);
    assert_eq!(manager.count_active_operations(), 0);
    Ok(())
}

/// A file the server does not have fails with the server's error.
#[tokio::test]
async fn test_missing_file_reports_file_not_found() -> Result<()> {
    let server = AssetServer::start(&[("present.bin", &b"here"[..])]).await?;
    let manager = connect(quiet_config(), server.port, 7).await?;

    let id = manager.request_file("absent.bin", FileType::Dlc)?;
    let capsule = next_event(&manager).await?;
    assert_eq!(capsule.event, NetworkEvent::FileRequestFailed);
    assert_eq!(capsule.error, ErrorType::FileNotFound);
    assert_eq!(capsule.operation_id, id);
    assert!(capsule.file.is_none());
    Ok(())
}

/// Saved bytes come back unchanged, for the longest legal name, an empty
/// file, and payloads that need several fragments.
#[tokio::test]
async fn test_save_then_request_round_trips() -> Result<()> {
    let server = AssetServer::start(&[]).await?;
    let manager = connect(quiet_config(), server.port, 0).await?;
    event_of(&manager, NetworkEvent::IdRequestDone).await?;

    let long_name = "n".repeat(256);
    let cases: Vec<(String, Vec<u8>)> = vec![
        ("a".to_string(), vec![0xAB]),
        ("empty.sav".to_string(), Vec::new()),
        (long_name, b"long name".to_vec()),
        (
            "multi.bin".to_string(),
            (0..MAX_FRAGMENT_PAYLOAD * 3 + 17).map(|i| (i % 251) as u8).collect(),
        ),
    ];

    for (name, data) in &cases {
        let id = manager.save_user_file(name, data.clone())?;
        let saved = next_event(&manager).await?;
        assert_eq!(saved.event, NetworkEvent::FileSaveDone, "saving {name}");
        assert_eq!(saved.operation_id, id);
        assert_eq!(server.stored(name).as_deref(), Some(&data[..]));

        let id = manager.request_file(name, FileType::User)?;
        let fetched = next_event(&manager).await?;
        assert_eq!(fetched.event, NetworkEvent::FileRequestDone, "fetching {name}");
        assert_eq!(fetched.operation_id, id);
        let file = fetched.file.context("download carried no file")?;
        assert_eq!(&file.file_name, name);
        assert_eq!(file.file_size as usize, data.len());
        assert_eq!(&file.data[..], &data[..]);
    }
    assert_eq!(manager.count_active_operations(), 0);
    assert_eq!(manager.count_pending_events(), 0);

    manager.shutdown()?;
    event_of(&manager, NetworkEvent::Suspended).await?;
    tokio::time::timeout(STEP_TIMEOUT, server.finish()).await?
}

/// Concurrent operations each get their own id and their own outcome.
#[tokio::test]
async fn test_concurrent_requests_are_demultiplexed() -> Result<()> {
    let files: Vec<(String, Vec<u8>)> = (0..8)
        .map(|i| (format!("f{i}.dat"), vec![i as u8; 1000 + i * 100]))
        .collect();
    let preload: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(n, d)| (n.as_str(), d.as_slice()))
        .collect();
    let server = AssetServer::start(&preload).await?;
    let manager = connect(quiet_config(), server.port, 3).await?;

    let mut expected = std::collections::HashMap::new();
    for (name, data) in &files {
        let id = manager.request_file(name, FileType::Dlc)?;
        assert!(expected.insert(id, data.clone()).is_none());
    }

    for _ in 0..files.len() {
        let capsule = next_event(&manager).await?;
        assert_eq!(capsule.event, NetworkEvent::FileRequestDone);
        let want = expected
            .remove(&capsule.operation_id)
            .context("event for an unknown operation")?;
        assert_eq!(&capsule.file.context("no file")?.data[..], &want[..]);
    }
    assert!(expected.is_empty());
    Ok(())
}

/// Bad arguments never reach the wire and never produce events.
#[tokio::test]
async fn test_argument_errors_are_synchronous() -> Result<()> {
    let server = AssetServer::start(&[]).await?;
    let manager = connect(quiet_config(), server.port, 9).await?;

    let errors = [
        manager.request_file("", FileType::Dlc).unwrap_err(),
        manager.request_file(&"x".repeat(257), FileType::Dlc).unwrap_err(),
        manager.request_file("x", FileType::NoFile).unwrap_err(),
    ];
    for e in &errors {
        assert!(e.is_argument_error(), "{e}");
    }
    assert!(matches!(errors[2], ClientError::InvalidFileType(FileType::NoFile)));
    assert_eq!(manager.count_active_operations(), 0);
    assert_eq!(manager.count_pending_events(), 0);

    // The connection is still usable.
    manager.save_user_file("ok.bin", vec![1, 2, 3])?;
    assert_eq!(next_event(&manager).await?.event, NetworkEvent::FileSaveDone);
    Ok(())
}

/// An `Error` reply to an id request surfaces as `IdRequestFailed`.
#[tokio::test]
async fn test_id_refusal_is_reported() -> Result<()> {
    let (listener, port) = listen().await?;
    let mut manager = OperationManager::new(quiet_config());
    manager.connect("127.0.0.1", port, 0).await?;
    let mut peer = accept(&listener).await?;

    let request = recv(&mut peer).await?;
    assert!(request.is(PacketType::IdRequest));
    send(
        &mut peer,
        &Packet::new(
            PacketType::Error,
            request.operation_id,
            payload::encode_error(PacketType::IdRequest, ErrorType::NoMoreId),
        ),
    )
    .await?;

    let capsule = event_of(&manager, NetworkEvent::IdRequestFailed).await?;
    assert_eq!(capsule.error, ErrorType::NoMoreId);
    assert_eq!(manager.user_id(), 0);
    assert!(matches!(
        manager.request_file("a", FileType::Dlc),
        Err(ClientError::MissingUserId)
    ));
    Ok(())
}
