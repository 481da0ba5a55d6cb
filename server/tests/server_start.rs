//! Startet den Server auf einem freien Port und beendet ihn wieder

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tuschel_server::{config::ServerConfig, Server};
use tuschel_signaling::{ClientConfig, SignalingClient};

#[tokio::test]
async fn server_nimmt_clients_an_und_faehrt_herunter() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let adresse = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = watch::channel(false);
    let server = tokio::spawn(Server::neu(ServerConfig::default()).ausfuehren(listener, stop_rx));

    let (client, _notices) = SignalingClient::verbinden(&adresse.to_string(), ClientConfig::default())
        .await
        .unwrap();
    let code = client.create_room("alice").await.unwrap();
    assert_eq!(code.as_str().len(), 6);

    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("Server hat nicht beendet")
        .unwrap()
        .unwrap();
}
