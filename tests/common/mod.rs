//! Shared harness for gateway integration tests

#![allow(dead_code)]

use carebot_core::core::transport::SerialLink;
use carebot_core::{Gateway, GatewayConfig, VirtualController, VirtualLink};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// Upper bound for any single wait in these tests
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Config bound to an ephemeral loopback port with fast telemetry polling
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.serial.poll_interval_ms = 5;
    config.serial.settle_ms = 0;
    config
}

/// A gateway serving on loopback
pub struct Harness {
    pub gateway: Gateway,
    pub addr: SocketAddr,
    pub controller: Option<VirtualController>,
    pub server: JoinHandle<carebot_core::GatewayResult<()>>,
}

impl Harness {
    /// Serve with a virtual controller
    pub async fn start(config: GatewayConfig) -> Self {
        let (link, controller) = VirtualLink::pair();
        Self::spawn(config, Some(Box::new(link)), Some(controller)).await
    }

    /// Serve without any controller
    pub async fn start_without_device(config: GatewayConfig) -> Self {
        Self::spawn(config, None, None).await
    }

    async fn spawn(
        config: GatewayConfig,
        link: Option<Box<dyn SerialLink>>,
        controller: Option<VirtualController>,
    ) -> Self {
        let gateway = Gateway::new(&config, link).expect("valid config");
        let listener = gateway.bind().await.expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let serving = gateway.clone();
        let server = tokio::spawn(async move { serving.serve(listener).await });
        Self {
            gateway,
            addr,
            controller,
            server,
        }
    }

    /// The virtual controller behind the gateway
    pub fn controller(&self) -> &VirtualController {
        self.controller.as_ref().expect("harness has a controller")
    }

    /// Connect a client and wait until the gateway has registered it
    pub async fn connect(&self) -> Client {
        let before = self.gateway.session_count();
        let client = Client::connect(self.addr).await;
        let gateway = self.gateway.clone();
        wait_until(move || gateway.session_count() > before).await;
        client
    }

    /// Stop the gateway and wait for `serve` to return
    pub async fn stop(self) {
        self.gateway.shutdown();
        tokio::time::timeout(TIMEOUT, self.server)
            .await
            .expect("serve returned in time")
            .expect("serve task")
            .expect("serve result");
    }
}

/// A line-oriented TCP client
pub struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    /// Connect to the gateway
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    /// Send one newline-terminated line
    pub async fn send(&mut self, line: &str) {
        self.send_raw(format!("{line}\n").as_bytes()).await;
    }

    /// Send raw bytes
    pub async fn send_raw(&mut self, data: &[u8]) {
        self.writer.write_all(data).await.expect("write");
    }

    /// Close the sending direction
    pub async fn finish(&mut self) {
        self.writer.shutdown().await.expect("shutdown write half");
    }

    /// Next line from the gateway, `None` at end of stream
    pub async fn recv(&mut self) -> Option<String> {
        tokio::time::timeout(TIMEOUT, self.lines.next_line())
            .await
            .expect("line in time")
            .expect("read line")
    }

    /// Send a line and return the gateway's reply
    pub async fn request(&mut self, line: &str) -> String {
        self.send(line).await;
        self.recv().await.expect("reply")
    }
}

/// Poll `condition` until it holds
pub async fn wait_until(condition: impl Fn() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}

/// Run `future` under [`TIMEOUT`]
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(TIMEOUT, future)
        .await
        .expect("completed in time")
}
