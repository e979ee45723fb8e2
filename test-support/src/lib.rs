use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

pub mod fake_mailgun;
pub mod fake_smtp;
pub mod gateway_process;

/// Returns a port on the loopback interface which was free at the time of the call.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|address| address.port())
        .unwrap()
}

pub fn setup_logging() {
    let _ = TermLogger::init(
        LevelFilter::Debug,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}
