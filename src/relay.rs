//! 손실 네트워크 릴레이
//!
//! 송신자와 수신자 사이에서 데이터그램을 중계하며 장애를 주입:
//!
//! | 장애   | 설명                                              |
//! |--------|---------------------------------------------------|
//! | 손실   | `loss_rate` 확률로 폐기                           |
//! | 손상   | `corrupt_rate` 확률로 임의 비트 하나 반전         |
//! | 재정렬 | `reorder_rate` 확률로 보류, 다음 데이터그램 뒤에 전달 |
//! | 중복   | `duplicate_rate` 확률로 두 번 전달                |
//!
//! 시드를 주면 같은 입력 순서에 대해 같은 장애가 재현됨.

use std::net::SocketAddr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::socket::{bind_udp, unspecified_for};
use crate::{Config, Result};

/// 통계 로그 간격 (데이터그램)
const STATS_LOG_INTERVAL: u64 = 10_000;

/// 장애 주입 설정 (확률은 `[0.0, 1.0]`로 잘림)
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    pub loss_rate: f64,
    pub duplicate_rate: f64,
    pub reorder_rate: f64,
    pub corrupt_rate: f64,
    /// 난수 시드 (없으면 OS 엔트로피)
    pub seed: Option<u64>,
}

impl RelayConfig {
    /// 장애 없는 중계
    pub fn transparent() -> Self {
        Self::default()
    }

    pub fn with_loss(mut self, rate: f64) -> Self {
        self.loss_rate = rate;
        self
    }

    pub fn with_duplicate(mut self, rate: f64) -> Self {
        self.duplicate_rate = rate;
        self
    }

    pub fn with_reorder(mut self, rate: f64) -> Self {
        self.reorder_rate = rate;
        self
    }

    pub fn with_corrupt(mut self, rate: f64) -> Self {
        self.corrupt_rate = rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn clamped(mut self) -> Self {
        for rate in [
            &mut self.loss_rate,
            &mut self.duplicate_rate,
            &mut self.reorder_rate,
            &mut self.corrupt_rate,
        ] {
            *rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        }
        self
    }
}

/// 중계 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// 클라이언트(송신자) -> 상류(수신자)
    Upstream,
    /// 상류 -> 클라이언트
    Downstream,
}

/// 장애 카운터
#[derive(Debug, Default)]
struct RelayCounters {
    forwarded: u64,
    dropped: u64,
    corrupted: u64,
    reordered: u64,
    duplicated: u64,
}

/// 손실 릴레이
pub struct LossyRelay {
    config: RelayConfig,
    /// 클라이언트가 보내는 소켓
    listener: UdpSocket,
    /// 상류로 보내는 소켓
    upstream: UdpSocket,
    upstream_addr: SocketAddr,
    /// 마지막으로 데이터그램을 보낸 클라이언트
    client: Option<SocketAddr>,
    /// 재정렬로 보류 중인 데이터그램
    held: Option<(Direction, Vec<u8>)>,
    rng: StdRng,
    counters: RelayCounters,
}

impl LossyRelay {
    pub fn bind(listen: SocketAddr, upstream_addr: SocketAddr, config: RelayConfig) -> Result<Self> {
        let socket_config = Config::default();
        let listener = bind_udp(listen, &socket_config)?;
        let upstream = bind_udp(unspecified_for(upstream_addr), &socket_config)?;

        let config = config.clamped();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config,
            listener,
            upstream,
            upstream_addr,
            client: None,
            held: None,
            rng,
            counters: RelayCounters::default(),
        })
    }

    /// 클라이언트가 보낼 주소
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// 무한 중계 (태스크 취소로 종료)
    pub async fn run(mut self) -> Result<()> {
        info!(
            "SARQ Relay {} -> {} (loss {:.2}, dup {:.2}, reorder {:.2}, corrupt {:.2})",
            self.listener.local_addr()?,
            self.upstream_addr,
            self.config.loss_rate,
            self.config.duplicate_rate,
            self.config.reorder_rate,
            self.config.corrupt_rate
        );

        let mut client_buf = vec![0u8; 65536];
        let mut upstream_buf = vec![0u8; 65536];

        loop {
            let (direction, received) = tokio::select! {
                r = self.listener.recv_from(&mut client_buf) => (Direction::Upstream, r),
                r = self.upstream.recv_from(&mut upstream_buf) => (Direction::Downstream, r),
            };

            let (len, from) = match received {
                Ok(received) => received,
                Err(e) => {
                    warn!(?direction, "릴레이 수신 에러: {}", e);
                    continue;
                }
            };

            let datagram = match direction {
                Direction::Upstream => {
                    self.client = Some(from);
                    client_buf[..len].to_vec()
                }
                Direction::Downstream => upstream_buf[..len].to_vec(),
            };
            self.forward(direction, datagram).await;
        }
    }

    /// 장애 모델 적용 후 전달
    async fn forward(&mut self, direction: Direction, mut datagram: Vec<u8>) {
        if self.rng.gen_bool(self.config.loss_rate) {
            self.counters.dropped += 1;
            debug!(?direction, len = datagram.len(), "데이터그램 폐기");
            return;
        }

        if !datagram.is_empty() && self.rng.gen_bool(self.config.corrupt_rate) {
            let bit = self.rng.gen_range(0..datagram.len() * 8);
            datagram[bit / 8] ^= 1 << (bit % 8);
            self.counters.corrupted += 1;
        }

        if self.held.is_none() && self.rng.gen_bool(self.config.reorder_rate) {
            self.counters.reordered += 1;
            self.held = Some((direction, datagram));
            return;
        }

        self.deliver(direction, &datagram).await;
        if self.rng.gen_bool(self.config.duplicate_rate) {
            self.counters.duplicated += 1;
            self.deliver(direction, &datagram).await;
        }

        // 보류했던 데이터그램은 방금 것 뒤로
        if let Some((held_direction, held)) = self.held.take() {
            self.deliver(held_direction, &held).await;
        }
    }

    async fn deliver(&mut self, direction: Direction, datagram: &[u8]) {
        let (socket, target) = match direction {
            Direction::Upstream => (&self.upstream, self.upstream_addr),
            Direction::Downstream => match self.client {
                Some(client) => (&self.listener, client),
                None => return,
            },
        };

        if let Err(e) = socket.send_to(datagram, target).await {
            warn!(?direction, "릴레이 전송 실패: {}", e);
            return;
        }

        self.counters.forwarded += 1;
        if self.counters.forwarded % STATS_LOG_INTERVAL == 0 {
            info!("Relay stats: {:?}", self.counters);
        }
    }
}
