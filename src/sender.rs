//! 송신자
//!
//! - 첫 프레임(메타데이터 포함) 전송 후 ACK를 받을 때마다 윈도우를 채움
//! - 프레임마다 독립된 재전송 태스크 (고정 주기, ACK 확인 또는 전송 실패 시 종료)
//! - 모든 프레임이 읽히고 윈도우가 비면 전송 완료

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::frame::{self, TransferPlan};
use crate::socket::{bind_udp, unspecified_for};
use crate::stats::TransferStats;
use crate::window::{AckOutcome, SharedWindow};
use crate::{Config, Result, ACK_SIZE};

/// 진행률 로그 간격 (프레임)
const PROGRESS_LOG_INTERVAL: u32 = 1024;

/// 송신자 (전송 한 건 단위)
pub struct Sender {
    /// 설정
    config: Config,

    /// 송신 겸 ACK 수신 소켓
    socket: Arc<UdpSocket>,

    /// 수신자 주소
    target: SocketAddr,

    /// 재전송 태스크와 공유하는 윈도우
    window: Arc<SharedWindow>,

    /// 시퀀스 인덱스별 재전송 태스크 (윈도우에서 해제되면 제거)
    retransmit_tasks: BTreeMap<u32, JoinHandle<()>>,

    /// 전송 통계
    stats: Arc<RwLock<TransferStats>>,

    /// 다음에 만들 프레임 인덱스
    next_index: u32,
}

impl Sender {
    /// 임의 로컬 포트에 바인딩한 송신자 생성
    pub fn connect(target: SocketAddr, config: Config) -> Result<Self> {
        let socket = bind_udp(unspecified_for(target), &config)?;
        info!(
            "SARQ Sender bound to {}, target: {}",
            socket.local_addr()?,
            target
        );
        Ok(Self::with_socket(socket, target, config))
    }

    /// 이미 바인딩된 소켓으로 송신자 생성
    pub fn with_socket(socket: UdpSocket, target: SocketAddr, config: Config) -> Self {
        Self {
            window: Arc::new(SharedWindow::new(config.window_size)),
            config,
            socket: Arc::new(socket),
            target,
            retransmit_tasks: BTreeMap::new(),
            stats: Arc::new(RwLock::new(TransferStats::new())),
            next_index: 0,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 파일 전송. 모든 프레임이 ACK되면 통계를 반환
    ///
    /// 응답이 없는 수신자에 대해서는 무한히 재전송함 (타임아웃 없음).
    pub async fn send_file(mut self, source: impl AsRef<Path>, dest_name: &str) -> Result<TransferStats> {
        let source = source.as_ref();
        let file = File::open(source).await?;
        let file_len = file.metadata().await?.len();
        let plan = TransferPlan::new(file_len, dest_name)?;
        let mut reader = BufReader::new(file);

        info!(
            "Sending {:?} as {:?}: {} bytes in {} frames",
            source,
            dest_name,
            file_len,
            plan.frame_count()
        );

        {
            let mut stats = self.stats.write();
            *stats = TransferStats::new();
            stats.total_bytes = file_len;
        }

        // 첫 프레임 (메타데이터)
        self.admit_next(&mut reader, &plan).await?;

        if plan.is_single_frame() {
            // 프레임 하나짜리 전송: 윈도우 필요 없음
            while !self.window.is_acked(0) {
                self.receive_ack().await;
            }
        } else {
            loop {
                self.receive_ack().await;

                while !self.window.is_full() && self.next_index <= plan.final_index {
                    self.admit_next(&mut reader, &plan).await?;
                }

                if self.next_index > plan.final_index && self.window.is_empty() {
                    break;
                }
            }
        }

        self.cancel_retransmits();

        let stats = {
            let mut stats = self.stats.write();
            stats.finish();
            stats.clone()
        };
        info!("Transfer complete: {}", stats.sender_summary());
        Ok(stats)
    }

    /// 다음 프레임을 읽어 윈도우에 넣고 전송, 재전송 타이머 시작
    async fn admit_next<R>(&mut self, reader: &mut R, plan: &TransferPlan) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let index = self.next_index;
        let mut payload = vec![0u8; plan.payload_len(index)];
        reader.read_exact(&mut payload).await?;

        let metadata = (index == 0).then(|| plan.metadata());
        let frame = frame::encode_data_frame(index, &payload, metadata.as_ref())?;

        // 호출자가 is_full로 막으므로 여기서 실패하면 계약 위반
        self.window.add(index, frame.clone())?;
        self.next_index += 1;

        {
            let mut stats = self.stats.write();
            stats.frames_sent += 1;
            stats.record_in_flight(self.window.size());
        }

        if let Err(e) = self.socket.send_to(&frame, self.target).await {
            // 첫 재전송 주기에 다시 시도됨
            warn!(index, "프레임 전송 실패: {}", e);
        }
        trace!(index, "프레임 전송");

        if index % PROGRESS_LOG_INTERVAL == 0 && index > 0 {
            info!(
                "Progress: frame {}/{} ({:.1}%), acked through {:?}",
                index,
                plan.final_index,
                index as f64 / plan.final_index as f64 * 100.0,
                self.window.last_consecutive_acked()
            );
        }

        self.arm_retransmit(index);
        Ok(())
    }

    /// 프레임별 주기적 재전송 태스크 (프레임 바이트는 윈도우에서 가져옴)
    fn arm_retransmit(&mut self, index: u32) {
        let window = Arc::clone(&self.window);
        let socket = Arc::clone(&self.socket);
        let stats = Arc::clone(&self.stats);
        let target = self.target;
        let period = self.config.retransmit_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let frame = match window.pending_frame(index) {
                    Some(frame) => frame,
                    None => break,
                };
                if let Err(e) = socket.send_to(&frame, target).await {
                    warn!(index, "재전송 실패, 타이머 중단: {}", e);
                    break;
                }
                stats.write().retransmitted_frames += 1;
                trace!(index, "프레임 재전송");
            }
        });

        self.retransmit_tasks.insert(index, handle);
    }

    /// ACK 하나를 받아 윈도우에 반영 (일시적 수신 에러는 재시도)
    async fn receive_ack(&mut self) {
        // 크기가 다른 데이터그램을 걸러내기 위해 1바이트 여유
        let mut buf = [0u8; ACK_SIZE + 1];

        let len = loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, _)) => break len,
                Err(e) => {
                    warn!("ACK 수신 에러: {}", e);
                }
            }
        };

        match frame::decode_and_validate_ack(&buf[..len]) {
            Ok(index) => {
                let outcome = self.window.ack(index);
                {
                    let mut stats = self.stats.write();
                    stats.acks_received += 1;
                    if outcome == AckOutcome::Ignored {
                        stats.stale_acks += 1;
                    }
                }
                debug!(index, ?outcome, "ACK 수신");

                if let AckOutcome::Advanced { .. } = outcome {
                    self.release_acked_tasks();
                }
            }
            Err(e) => {
                self.stats.write().corrupt_acks += 1;
                debug!("손상된 ACK 폐기: {}", e);
            }
        }
    }

    /// 윈도우에서 해제된 프레임의 재전송 태스크 제거
    fn release_acked_tasks(&mut self) {
        let last = match self.window.last_consecutive_acked() {
            Some(last) => last,
            None => return,
        };

        let pending = self.retransmit_tasks.split_off(&(last + 1));
        let released = std::mem::replace(&mut self.retransmit_tasks, pending);
        for handle in released.into_values() {
            handle.abort();
        }
    }

    /// 남은 재전송 태스크 중단
    fn cancel_retransmits(&mut self) {
        for handle in std::mem::take(&mut self.retransmit_tasks).into_values() {
            handle.abort();
        }
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        // 에러로 중단된 전송의 타이머가 계속 돌지 않도록
        self.cancel_retransmits();
    }
}
