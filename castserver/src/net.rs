//! Address helpers for the URLs handed to the renderer.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Guesses the local IP address.
///
/// Asks the OS which interface would route to a public address (UDP is
/// connectionless, nothing is sent). Falls back to loopback.
pub fn guess_local_ip() -> IpAddr {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Host part of a URL: IPv6 literals are bracketed, anything else is kept.
pub fn url_host(host: &str) -> String {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    match bare.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("[{}]", v6),
        _ => host.to_string(),
    }
}

/// `scheme://host:port/path` with the host passed through [`url_host`].
pub fn build_url(scheme: &str, host: &str, port: u16, path: &str) -> String {
    format!(
        "{}://{}:{}/{}",
        scheme,
        url_host(host),
        port,
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_host() {
        assert_eq!(url_host("192.168.1.20"), "192.168.1.20");
        assert_eq!(url_host("fe80::1"), "[fe80::1]");
        assert_eq!(url_host("[fe80::1]"), "[fe80::1]");
        assert_eq!(url_host("caster.local"), "caster.local");
    }

    #[test]
    fn test_build_url() {
        assert_eq!(
            build_url("http", "10.0.0.5", 9000, "/stream.mp3"),
            "http://10.0.0.5:9000/stream.mp3"
        );
        assert_eq!(
            build_url("x-rincon-mp3radio", "::1", 9000, "stream.mp3"),
            "x-rincon-mp3radio://[::1]:9000/stream.mp3"
        );
    }

    #[test]
    fn test_guess_local_ip_is_usable() {
        let ip = guess_local_ip();
        assert!(!ip.is_unspecified());
    }
}
