//! UDP 소켓 생성
//!
//! 커널 드롭이 네트워크 손실처럼 보이지 않도록 송수신 버퍼를 최대로 요청한 뒤
//! tokio 소켓으로 넘김. 커널은 요청값을 자체 상한으로 잘라냄.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::{Config, Error, Result};

/// 설정된 버퍼 크기로 UDP 소켓 바인딩 (tokio 런타임 안에서 호출)
pub fn bind_udp(addr: SocketAddr, config: &Config) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;

    if let Err(e) = socket.set_recv_buffer_size(config.recv_buffer_size) {
        warn!("수신 버퍼 설정 실패: {}", e);
    }
    if let Err(e) = socket.set_send_buffer_size(config.send_buffer_size) {
        warn!("송신 버퍼 설정 실패: {}", e);
    }
    debug!(
        recv_buffer = socket.recv_buffer_size().unwrap_or(0),
        send_buffer = socket.send_buffer_size().unwrap_or(0),
        "socket buffers configured"
    );

    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    Ok(UdpSocket::from_std(socket.into())?)
}

/// 대상 주소와 같은 주소 체계의 임의 로컬 주소
pub fn unspecified_for(target: SocketAddr) -> SocketAddr {
    let ip = match target {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    SocketAddr::new(ip, 0)
}

/// 호스트 이름 해석 (첫 번째 주소 사용)
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| Error::AddressResolution(format!("{}:{}", host, port)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let socket = bind_udp(addr, &Config::default()).unwrap();
        assert_ne!(socket.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_resolve_localhost() {
        let addr = resolve("127.0.0.1", 9000).await.unwrap();
        assert_eq!(addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_unspecified_matches_family() {
        let v6: SocketAddr = "[::1]:1".parse().unwrap();
        assert!(unspecified_for(v6).is_ipv6());
        assert_eq!(unspecified_for(v6).port(), 0);
    }
}
