use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use dogfight_server::app::AppState;
use dogfight_server::config::{ActivationMode, Config, GameConfig};
use dogfight_server::game::GameServer;
use dogfight_server::http::build_router;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the full router on an ephemeral port
async fn spawn_server(activation: ActivationMode) -> anyhow::Result<SocketAddr> {
    let config = Config {
        game: GameConfig {
            activation,
            respawn_delay: Duration::from_millis(200),
            ..GameConfig::default()
        },
        ..Config::default()
    };

    let (game_server, game) = GameServer::new(config.game.clone());
    tokio::spawn(game_server.run());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let router = build_router(AppState::new(config, game));
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    Ok(addr)
}

async fn join(addr: SocketAddr) -> anyhow::Result<Client> {
    let (client, _) = connect_async(format!("ws://{}/ws", addr)).await?;
    Ok(client)
}

async fn send(client: &mut Client, msg: Value) -> anyhow::Result<()> {
    client.send(Message::Text(msg.to_string())).await?;
    Ok(())
}

/// Next JSON text frame, failing after a generous timeout
async fn recv(client: &mut Client) -> anyhow::Result<Value> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("socket closed"))??;
        if let Message::Text(text) = frame {
            return Ok(serde_json::from_str(&text)?);
        }
    }
}

/// Skip frames until one of the given type arrives
async fn recv_type(client: &mut Client, kind: &str) -> anyhow::Result<Value> {
    loop {
        let frame = recv(client).await?;
        if frame["type"] == kind {
            return Ok(frame);
        }
    }
}

#[tokio::test]
async fn gated_session_lifecycle() -> anyhow::Result<()> {
    let addr = spawn_server(ActivationMode::Gated).await?;

    let mut alice = join(addr).await?;
    assert_eq!(recv(&mut alice).await?, json!({"type": "your_id", "id": 1}));
    let mut bob = join(addr).await?;
    assert_eq!(recv(&mut bob).await?, json!({"type": "your_id", "id": 2}));

    send(&mut alice, json!({"type": "select_plane", "planeType": "spad"})).await?;
    let state = recv(&mut alice).await?;
    assert_eq!(state["type"], "game_state");
    assert_eq!(state["state"]["1"]["planeType"], "spad");

    // Bob is still pending but hears about Alice
    let joined = recv(&mut bob).await?;
    assert_eq!(joined["type"], "player_joined");
    assert_eq!(joined["player"]["id"], 1);

    send(&mut bob, json!({"type": "select_plane", "planeType": "red_baron"})).await?;
    let state = recv(&mut bob).await?;
    assert_eq!(state["state"].as_object().map(|s| s.len()), Some(2));
    recv_type(&mut alice, "player_joined").await?;

    // Garbage does not hurt the session
    alice.send(Message::Text("{nope".to_string())).await?;
    send(&mut alice, json!({"type": "update_state", "state": {"x": 42.0}})).await?;
    let update = recv(&mut bob).await?;
    assert_eq!(update["type"], "player_update");
    assert_eq!(update["player"]["x"], 42.0);

    send(&mut alice, json!({"type": "hit_player", "targetId": 2, "damage": 100})).await?;
    let killed = recv_type(&mut bob, "player_killed").await?;
    assert_eq!(
        killed,
        json!({"type": "player_killed", "victimId": 2, "killerId": 1, "killerKills": 1})
    );

    let respawn = recv_type(&mut bob, "player_update").await?;
    assert_eq!(respawn["player"]["id"], 2);
    assert_eq!(respawn["player"]["isAlive"], true);
    assert_eq!(respawn["player"]["health"], 100);

    bob.close(None).await?;
    let left = recv_type(&mut alice, "player_left").await?;
    assert_eq!(left, json!({"type": "player_left", "id": 2}));

    Ok(())
}

#[tokio::test]
async fn immediate_mode_spawns_on_connect() -> anyhow::Result<()> {
    let addr = spawn_server(ActivationMode::Immediate).await?;

    let mut alice = join(addr).await?;
    assert_eq!(recv(&mut alice).await?["type"], "your_id");
    let state = recv(&mut alice).await?;
    assert_eq!(state["type"], "game_state");
    assert_eq!(state["state"]["1"]["isAlive"], true);
    assert_eq!(state["state"]["1"]["z"], -1500.0);

    let mut bob = join(addr).await?;
    recv(&mut bob).await?;
    let state = recv(&mut bob).await?;
    assert_eq!(state["state"].as_object().map(|s| s.len()), Some(2));

    let joined = recv(&mut alice).await?;
    assert_eq!(joined["type"], "player_joined");
    assert_eq!(joined["player"]["id"], 2);
    assert_eq!(joined["player"]["x"], 1500.0);

    Ok(())
}

#[tokio::test]
async fn health_endpoint_answers() -> anyhow::Result<()> {
    let addr = spawn_server(ActivationMode::Gated).await?;

    let mut stream = TcpStream::connect(addr).await?;
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await?;
    let mut response = String::new();
    stream.read_to_string(&mut response).await?;

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains(r#""status":"ok""#));
    Ok(())
}
