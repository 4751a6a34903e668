//! 전송 통계

use std::time::{Duration, Instant};

/// 전체 전송 통계 (송신/수신 공용, 해당 없는 필드는 0)
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 완료 시간
    pub finish_time: Option<Instant>,

    /// 파일 바이트 수 (송신: 원본 길이, 수신: 기록한 바이트)
    pub total_bytes: u64,

    /// 처음 전송한 프레임 수
    pub frames_sent: u64,

    /// 재전송한 프레임 수
    pub retransmitted_frames: u64,

    /// 수신한 유효 ACK 수
    pub acks_received: u64,

    /// CRC 불일치 ACK 수
    pub corrupt_acks: u64,

    /// 윈도우 범위 밖 ACK 수
    pub stale_acks: u64,

    /// 동시에 전송 중이던 프레임 수의 최댓값
    pub peak_in_flight: usize,

    /// 수신한 유효 프레임 수
    pub frames_received: u64,

    /// 손상된 프레임 수
    pub corrupt_frames: u64,

    /// 윈도우 밖이라 폐기한 프레임 수
    pub out_of_window_frames: u64,

    /// 이미 기록했거나 버퍼에 있던 프레임 수
    pub duplicate_frames: u64,

    /// 재조립 버퍼를 거친 프레임 수
    pub buffered_frames: u64,

    /// 보낸 ACK 수
    pub acks_sent: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            finish_time: None,
            total_bytes: 0,
            frames_sent: 0,
            retransmitted_frames: 0,
            acks_received: 0,
            corrupt_acks: 0,
            stale_acks: 0,
            peak_in_flight: 0,
            frames_received: 0,
            corrupt_frames: 0,
            out_of_window_frames: 0,
            duplicate_frames: 0,
            buffered_frames: 0,
            acks_sent: 0,
        }
    }

    /// 완료 시각 기록
    pub fn finish(&mut self) {
        self.finish_time.get_or_insert_with(Instant::now);
    }

    /// 경과 시간 (완료 후에는 고정)
    pub fn elapsed(&self) -> Duration {
        match self.finish_time {
            Some(finish) => finish.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// in-flight 최댓값 갱신
    pub fn record_in_flight(&mut self, in_flight: usize) {
        self.peak_in_flight = self.peak_in_flight.max(in_flight);
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 재전송 비율
    pub fn retransmit_ratio(&self) -> f64 {
        if self.frames_sent == 0 {
            return 0.0;
        }
        self.retransmitted_frames as f64 / self.frames_sent as f64
    }

    /// 송신측 요약 문자열
    pub fn sender_summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Bytes: {} | Frames: {} | Retransmits: {} ({:.1}%) | ACKs: {} (corrupt {}, stale {}) | Peak in-flight: {} | Throughput: {:.2} MB/s",
            self.elapsed().as_secs_f64(),
            self.total_bytes,
            self.frames_sent,
            self.retransmitted_frames,
            self.retransmit_ratio() * 100.0,
            self.acks_received,
            self.corrupt_acks,
            self.stale_acks,
            self.peak_in_flight,
            self.throughput() / 1_000_000.0,
        )
    }

    /// 수신측 요약 문자열
    pub fn receiver_summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Bytes: {} | Frames: {} | Corrupt: {} | Out-of-window: {} | Duplicates: {} | Buffered: {} | ACKs: {} | Throughput: {:.2} MB/s",
            self.elapsed().as_secs_f64(),
            self.total_bytes,
            self.frames_received,
            self.corrupt_frames,
            self.out_of_window_frames,
            self.duplicate_frames,
            self.buffered_frames,
            self.acks_sent,
            self.throughput() / 1_000_000.0,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}
