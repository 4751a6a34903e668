//! 프로토콜 설정

use std::time::Duration;

use crate::{DEFAULT_RETRANSMIT_INTERVAL_MS, DEFAULT_WINDOW_SIZE};

/// 커널이 허용하는 최대치까지 요청할 소켓 버퍼 크기 (커널이 상한으로 잘라냄)
pub const MAX_SOCKET_BUFFER: usize = i32::MAX as usize;

/// SARQ 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 슬라이딩 윈도우 크기 (동시에 전송 중일 수 있는 프레임 수)
    /// 수신측은 같은 값을 out-of-window 판정에 사용
    pub window_size: usize,

    /// 프레임별 재전송 주기 (밀리초)
    pub retransmit_interval_ms: u64,

    /// 수신 완료 후 추가 프레임이 없을 때까지 대기하는 시간 (밀리초)
    /// 이 동안 재전송된 프레임에도 계속 ACK를 보냄
    pub completion_linger_ms: u64,

    /// 수신 버퍼 크기
    pub recv_buffer_size: usize,

    /// 송신 버퍼 크기
    pub send_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,                // 4096 프레임
            retransmit_interval_ms: DEFAULT_RETRANSMIT_INTERVAL_MS, // 40ms
            completion_linger_ms: 2000,                      // 2초
            recv_buffer_size: MAX_SOCKET_BUFFER,
            send_buffer_size: MAX_SOCKET_BUFFER,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 윈도우 크기 변경
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size.max(1);
        self
    }

    /// 재전송 주기 변경
    pub fn with_retransmit_interval(mut self, interval: Duration) -> Self {
        self.retransmit_interval_ms = (interval.as_millis() as u64).max(1);
        self
    }

    /// 완료 대기 시간 변경
    pub fn with_completion_linger(mut self, linger: Duration) -> Self {
        self.completion_linger_ms = linger.as_millis() as u64;
        self
    }

    pub fn retransmit_interval(&self) -> Duration {
        Duration::from_millis(self.retransmit_interval_ms)
    }

    pub fn completion_linger(&self) -> Duration {
        Duration::from_millis(self.completion_linger_ms)
    }

    /// 같은 LAN 안에서의 전송용 설정
    pub fn lan() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            retransmit_interval_ms: 10,       // RTT가 짧으므로 빠른 재전송
            completion_linger_ms: 500,
            ..Self::default()
        }
    }

    /// RTT가 긴 경로용 설정
    pub fn high_latency() -> Self {
        Self {
            window_size: 2 * DEFAULT_WINDOW_SIZE,
            retransmit_interval_ms: 250,      // RTT보다 짧으면 불필요한 재전송 폭증
            completion_linger_ms: 5000,
            ..Self::default()
        }
    }

    /// 이름으로 프리셋 선택 (`default`, `lan`, `high-latency`)
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "lan" => Some(Self::lan()),
            "high-latency" => Some(Self::high_latency()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_protocol_constants() {
        let config = Config::default();
        assert_eq!(config.window_size, 4096);
        assert_eq!(config.retransmit_interval(), Duration::from_millis(40));
    }

    #[test]
    fn test_builders_clamp_to_sane_values() {
        let config = Config::new()
            .with_window_size(0)
            .with_retransmit_interval(Duration::ZERO);

        assert_eq!(config.window_size, 1);
        assert_eq!(config.retransmit_interval_ms, 1);
    }

    #[test]
    fn test_preset_by_name() {
        assert_eq!(Config::preset("lan").unwrap().retransmit_interval_ms, 10);
        assert_eq!(Config::preset("high-latency").unwrap().window_size, 8192);
        assert_eq!(Config::preset("default").unwrap().completion_linger_ms, 2000);
        assert!(Config::preset("satellite").is_none());
    }
}
