//! Synchronous client side of the suggestion daemon.
//!
//! Used by the one-shot `suggest` command. Any failure, including no daemon
//! running at all, degrades to `None` so the caller can fall back to a direct
//! completion call or stay silent.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::daemon::SuggestRequest;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(250);
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Read the daemon's port from its port file.
pub fn daemon_port(port_file: &Path) -> Option<u16> {
    let contents = std::fs::read_to_string(port_file).ok()?;
    contents.trim().parse().ok()
}

pub fn is_daemon_running(port_file: &Path) -> bool {
    let Some(port) = daemon_port(port_file) else {
        return false;
    };
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).is_ok()
}

/// One request/response exchange with a running daemon. `None` means no
/// usable suggestion for any reason.
pub fn fetch_suggestion(port_file: &Path, request: &SuggestRequest) -> Option<String> {
    let port = daemon_port(port_file)?;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let stream = match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
        Ok(s) => s,
        Err(err) => {
            debug!(%err, "daemon not reachable");
            return None;
        }
    };
    stream.set_write_timeout(Some(WRITE_TIMEOUT)).ok()?;
    stream.set_read_timeout(Some(READ_TIMEOUT)).ok()?;

    let mut line = serde_json::to_string(request).ok()?;
    line.push('\n');
    let mut writer = &stream;
    writer.write_all(line.as_bytes()).ok()?;
    writer.flush().ok()?;

    let mut response = String::new();
    BufReader::new(&stream).read_line(&mut response).ok()?;
    let suggestion = response.trim_end_matches(['\r', '\n']);
    if suggestion.is_empty() {
        None
    } else {
        Some(suggestion.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn port_parse_round_trip() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "43210").unwrap();
        assert_eq!(daemon_port(f.path()), Some(43210));
    }

    #[test]
    fn missing_or_garbage_port_file() {
        assert_eq!(daemon_port(Path::new("/nonexistent/port")), None);
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "not a port").unwrap();
        assert_eq!(daemon_port(f.path()), None);
    }

    #[test]
    fn fetch_without_daemon_is_none() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        // reserved port, nothing listens here
        writeln!(f, "1").unwrap();
        let req = SuggestRequest {
            buffer: "git ".into(),
            cwd: "/tmp".into(),
            shell: "zsh".into(),
        };
        assert_eq!(fetch_suggestion(f.path(), &req), None);
        assert!(!is_daemon_running(f.path()));
    }
}
