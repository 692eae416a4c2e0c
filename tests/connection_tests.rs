//! Integration tests for the live WebSocket connection

use futures::{SinkExt, StreamExt};
use pdfpal::connection::{
    ConnectionError, ConnectionEvent, ConnectionState, LiveConnection, LiveConnectionConfig,
    QueryRequest, QuerySink, Reply,
};
use pdfpal::protocol::{
    decode_client_event, encode_server_event, ClientEvent, ConnectedPayload, QueryPayload,
    ReplyPayload, ServerEvent, TypingPayload,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Next event, failing the test if none arrives in time
async fn next_event(events: &mut mpsc::Receiver<ConnectionEvent>) -> ConnectionEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a connection event")
        .expect("event stream closed")
}

/// Skip `Connecting` events until the socket is open
async fn wait_connected(events: &mut mpsc::Receiver<ConnectionEvent>) {
    loop {
        match next_event(events).await {
            ConnectionEvent::Connected => return,
            ConnectionEvent::Connecting { .. } => continue,
            other => panic!("unexpected event before connect: {:?}", other),
        }
    }
}

/// URL of a port nothing listens on
async fn unused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}/ws/chat", addr)
}

fn query(document_id: &str, text: &str) -> QueryRequest {
    QueryRequest {
        document_id: document_id.to_string(),
        query: text.to_string(),
        session_id: Some("temp_1700000000000_ab12cd34ef56".to_string()),
        user_id: "anonymous".to_string(),
    }
}

#[test]
fn test_config_requires_websocket_scheme() {
    assert!(matches!(
        LiveConnectionConfig::new("http://localhost:8000/ws/chat"),
        Err(ConnectionError::InvalidUrl(_))
    ));
    assert!(matches!(
        LiveConnectionConfig::new("not a url"),
        Err(ConnectionError::InvalidUrl(_))
    ));

    let config = LiveConnectionConfig::new("wss://chat.example.com/ws/chat").unwrap();
    assert_eq!(config.reconnect_attempts, 5);
    assert_eq!(config.reconnect_delay, Duration::from_secs(1));
    assert_eq!(config.connect_timeout, Duration::from_secs(10));
}

#[tokio::test]
async fn test_query_and_reply_round_trip() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}/ws/chat", listener.local_addr()?);

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        let mut ws = accept_async(stream).await?;

        let greeting = ServerEvent::Connected(ConnectedPayload {
            message: Some("Connected to chat server".to_string()),
            ..Default::default()
        });
        ws.send(Message::Text(encode_server_event(&greeting)?)).await?;

        while let Some(frame) = ws.next().await {
            if let Message::Text(text) = frame? {
                let ClientEvent::Query(query) = decode_client_event(&text)?;

                let typing = ServerEvent::Typing(TypingPayload {
                    status: Some("typing".to_string()),
                });
                ws.send(Message::Text(encode_server_event(&typing)?)).await?;

                let reply = ServerEvent::Response(ReplyPayload {
                    response: format!("Answer to: {}", query.query),
                    document_id: query.document_id.clone(),
                    session_id: Some("c9f1".to_string()),
                    sources: None,
                });
                ws.send(Message::Text(encode_server_event(&reply)?)).await?;
                return Ok::<QueryPayload, anyhow::Error>(query);
            }
        }
        anyhow::bail!("client disconnected before sending a query")
    });

    let config = LiveConnectionConfig::new(&url)?.with_reconnect(0, Duration::from_millis(10));
    let (connection, mut events) = LiveConnection::spawn(config);

    wait_connected(&mut events).await;
    assert_eq!(connection.state(), ConnectionState::Connected);

    connection.submit_query(query("doc-1", "What is the conclusion?"))?;

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Typing);
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Reply(Reply {
            text: "Answer to: What is the conclusion?".to_string(),
            document_id: "doc-1".to_string(),
            session_id: Some("c9f1".to_string()),
            sources: Vec::new(),
        })
    );

    let received = server.await??;
    assert_eq!(received.document_id, "doc-1");
    assert_eq!(received.user_id, "anonymous");
    assert_eq!(
        received.session_id.as_deref(),
        Some("temp_1700000000000_ab12cd34ef56")
    );

    connection.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_submit_while_disconnected_is_rejected() -> anyhow::Result<()> {
    let config = LiveConnectionConfig::new(&unused_url().await)?
        .with_reconnect(0, Duration::from_millis(10));
    let (connection, mut events) = LiveConnection::spawn(config);

    assert!(matches!(
        connection.submit_query(query("doc-1", "hello")),
        Err(ConnectionError::NotConnected)
    ));

    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Connecting { attempt: 1 }
    );
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected);
    assert!(!connection.is_connected());

    connection.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_gives_up_after_reconnect_attempts() -> anyhow::Result<()> {
    let config = LiveConnectionConfig::new(&unused_url().await)?
        .with_reconnect(2, Duration::from_millis(10));
    let (connection, mut events) = LiveConnection::spawn(config);

    for attempt in 1..=3 {
        assert_eq!(
            next_event(&mut events).await,
            ConnectionEvent::Connecting { attempt }
        );
    }
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected);

    // The task ends and drops its sender
    let closed = timeout(Duration::from_secs(5), events.recv()).await?;
    assert!(closed.is_none());
    assert_eq!(connection.state(), ConnectionState::Disconnected);

    connection.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_reconnects_after_server_drop() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}/ws/chat", listener.local_addr()?);

    let server = tokio::spawn(async move {
        // First connection is closed right away
        let (stream, _) = listener.accept().await?;
        let mut ws = accept_async(stream).await?;
        ws.close(None).await?;
        drop(ws);

        // Second one stays open until the client closes it
        let (stream, _) = listener.accept().await?;
        let mut ws = accept_async(stream).await?;
        while let Some(frame) = ws.next().await {
            if matches!(frame, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
        Ok::<(), anyhow::Error>(())
    });

    let config = LiveConnectionConfig::new(&url)?.with_reconnect(3, Duration::from_millis(20));
    let (connection, mut events) = LiveConnection::spawn(config);

    // A dropped socket goes straight back to connecting
    wait_connected(&mut events).await;
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Connecting { attempt: 1 }
    );
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    connection.shutdown().await;
    timeout(Duration::from_secs(5), server).await???;
    Ok(())
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}/ws/chat", listener.local_addr()?);

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        let mut ws = accept_async(stream).await?;
        ws.send(Message::Text("not json".to_string())).await?;
        ws.send(Message::Text(r#"{"event":"upload_progress","data":{}}"#.to_string()))
            .await?;
        ws.send(Message::Text(
            r#"{"event":"error","data":{"message":"Document not found"}}"#.to_string(),
        ))
        .await?;
        while ws.next().await.is_some() {}
        Ok::<(), anyhow::Error>(())
    });

    let config = LiveConnectionConfig::new(&url)?.with_reconnect(0, Duration::from_millis(10));
    let (connection, mut events) = LiveConnection::spawn(config);

    wait_connected(&mut events).await;
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Error("Document not found".to_string())
    );

    connection.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_while_retrying_reports_disconnected() -> anyhow::Result<()> {
    let config = LiveConnectionConfig::new(&unused_url().await)?
        .with_reconnect(100, Duration::from_secs(30));
    let (connection, mut events) = LiveConnection::spawn(config);

    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Connecting { attempt: 1 }
    );
    // Attempt 2 is announced before the reconnect delay starts
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Connecting { attempt: 2 }
    );
    assert_eq!(connection.state(), ConnectionState::Connecting);

    timeout(Duration::from_secs(5), connection.shutdown()).await?;
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected);
    Ok(())
}
