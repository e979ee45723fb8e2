use log::debug;
use mailin_embedded::{Handler, Server, SslConfig};
use std::{
    net::{IpAddr, TcpStream},
    time::Duration,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

const SERVER_NAME: &str = "insight-rtls.test";

#[derive(Clone)]
struct SmtpHandler(Vec<u8>, UnboundedSender<String>);

impl Handler for SmtpHandler {
    fn data(&mut self, buf: &[u8]) -> std::io::Result<()> {
        debug!("Got data:\n{}", String::from_utf8_lossy(buf));
        self.0.extend(buf);
        Ok(())
    }

    fn data_end(&mut self) -> mailin_embedded::Response {
        let content = String::from_utf8_lossy(&self.0).into_owned();
        self.0.clear();
        // The receiving side may be gone when a test has already finished.
        let _ = self.1.send(content);
        mailin_embedded::response::OK
    }

    fn auth_plain(
        &mut self,
        authorization_id: &str,
        authentication_id: &str,
        password: &str,
    ) -> mailin_embedded::Response {
        debug!("Got authentication data {authorization_id}, {authentication_id}, {password}");
        mailin_embedded::response::AUTH_OK
    }
}

/// An SMTP server which accepts every message and hands its raw content to the test, in order.
pub struct FakeSmtpServer {
    port: u16,
    server: std::sync::Mutex<Option<Server<SmtpHandler>>>,
    messages: tokio::sync::Mutex<UnboundedReceiver<String>>,
}

impl FakeSmtpServer {
    pub fn new(port: u16) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handler = SmtpHandler(Vec::new(), sender);
        let mut server = Server::new(handler);
        server
            .with_name(SERVER_NAME)
            .with_ssl(SslConfig::None)
            .unwrap()
            .with_addr(format!("127.0.0.1:{port}"))
            .unwrap();
        Self {
            port,
            server: std::sync::Mutex::new(Some(server)),
            messages: tokio::sync::Mutex::new(receiver),
        }
    }

    pub fn start(&self) {
        let mut guard = self.server.lock().unwrap();
        if let Some(server) = guard.take() {
            std::thread::spawn(move || {
                let _ = server.serve();
            });
            wait_until_listening(self.port);
        }
    }

    /// Waits for the next delivered message. `None` once the server has shut down.
    pub async fn next_mail_content(&self) -> Option<String> {
        self.messages.lock().await.recv().await
    }
}

#[derive(Clone)]
struct PoisonedSmtpHandler;

impl Handler for PoisonedSmtpHandler {
    fn helo(&mut self, _ip: IpAddr, _domain: &str) -> mailin_embedded::Response {
        mailin_embedded::response::INTERNAL_ERROR
    }

    fn mail(&mut self, _ip: IpAddr, _domain: &str, _from: &str) -> mailin_embedded::Response {
        mailin_embedded::response::INTERNAL_ERROR
    }
}

/// Starts an SMTP server which fails every session.
pub fn start_poisoned_smtp_server(port: u16) {
    let mut server = Server::new(PoisonedSmtpHandler);
    server
        .with_name(SERVER_NAME)
        .with_ssl(SslConfig::None)
        .unwrap()
        .with_addr(format!("127.0.0.1:{port}"))
        .unwrap();
    std::thread::spawn(move || {
        let _ = server.serve();
    });
    wait_until_listening(port);
}

fn wait_until_listening(port: u16) {
    for _ in 0..50 {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("Fake SMTP server did not start listening on port {port}");
}
