//! 수신자
//!
//! - 유효한 프레임마다 개별 ACK (중복 포함, 손상/윈도우 밖은 무응답)
//! - 기대 인덱스 프레임은 즉시 기록, 앞선 프레임은 재조립 버퍼에 보관
//! - 마지막 프레임 기록 후에도 송신자가 조용해질 때까지 ACK 유지

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::net::UdpSocket;
use tokio::time;
use tracing::{debug, info, trace, warn};

use crate::frame::{self, DataFrame, FrameMetadata};
use crate::reassembly::{InsertOutcome, ReassemblyBuffer};
use crate::socket::bind_udp;
use crate::stats::TransferStats;
use crate::{Config, Error, Result, FRAME_SIZE};

/// 데이터그램 하나의 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// 길이 또는 CRC 불일치 (ACK 없음)
    Corrupt,

    /// 수신 윈도우 밖 또는 마지막 인덱스 초과 (ACK 없음)
    OutOfWindow(u32),

    /// 이미 기록했거나 버퍼에 있는 프레임
    Duplicate(u32),

    /// 기대 인덱스 프레임 기록, 이어서 버퍼에서 `drained`개 기록
    Written { index: u32, drained: usize },

    /// 재조립 버퍼에 보관
    Buffered(u32),
}

impl FrameDisposition {
    /// ACK를 보내야 하는 인덱스
    pub fn ack_index(&self) -> Option<u32> {
        match *self {
            FrameDisposition::Corrupt | FrameDisposition::OutOfWindow(_) => None,
            FrameDisposition::Duplicate(index)
            | FrameDisposition::Buffered(index)
            | FrameDisposition::Written { index, .. } => Some(index),
        }
    }
}

/// 기록 중인 출력 파일
#[derive(Debug)]
struct Output {
    file: File,
    path: PathBuf,
    final_index: u32,
    final_payload_len: usize,
}

#[derive(Debug)]
enum SessionState {
    /// 인덱스 0 프레임 대기
    AwaitingMetadata,

    /// 파일 기록 중
    Streaming(Output),

    /// 마지막 프레임까지 기록 완료
    Complete { path: PathBuf },
}

/// 수신 세션 (소켓과 분리된 프레임 처리 상태)
#[derive(Debug)]
pub struct ReceiverSession {
    output_dir: PathBuf,
    window_size: usize,
    expected_index: u32,
    buffer: ReassemblyBuffer,
    state: SessionState,
    stats: TransferStats,
}

impl ReceiverSession {
    pub fn new(output_dir: impl Into<PathBuf>, window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            output_dir: output_dir.into(),
            window_size,
            expected_index: 0,
            buffer: ReassemblyBuffer::new(window_size),
            state: SessionState::AwaitingMetadata,
            stats: TransferStats::new(),
        }
    }

    /// 다음에 기록할 인덱스
    pub fn expected_index(&self) -> u32 {
        self.expected_index
    }

    /// 재조립 버퍼에 보관 중인 프레임 수
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, SessionState::Complete { .. })
    }

    /// 출력 파일 경로 (메타데이터 수신 후)
    pub fn output_path(&self) -> Option<&Path> {
        match &self.state {
            SessionState::AwaitingMetadata => None,
            SessionState::Streaming(output) => Some(&output.path),
            SessionState::Complete { path } => Some(path),
        }
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut TransferStats {
        &mut self.stats
    }

    /// 데이터그램 하나 처리
    ///
    /// 손상/범위 밖 프레임은 에러가 아니라 [`FrameDisposition`]으로 보고.
    /// 에러는 파일 생성/기록 실패와 잘못된 파일 이름뿐이며 전송을 중단해야 함.
    pub async fn handle_datagram(&mut self, datagram: &[u8]) -> Result<FrameDisposition> {
        let frame = match frame::decode_and_validate(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.corrupt_frames += 1;
                debug!("손상된 프레임 폐기: {}", e);
                return Ok(FrameDisposition::Corrupt);
            }
        };

        let index = frame.index;
        let distance = index as i64 - self.expected_index as i64;

        if distance >= self.window_size as i64 || self.beyond_final(index) {
            self.stats.out_of_window_frames += 1;
            trace!(index, expected = self.expected_index, "윈도우 밖 프레임 폐기");
            return Ok(FrameDisposition::OutOfWindow(index));
        }

        if distance < 0 {
            self.stats.frames_received += 1;
            self.stats.duplicate_frames += 1;
            return Ok(FrameDisposition::Duplicate(index));
        }

        if distance > 0 {
            return Ok(match self.buffer.insert(index, frame.payload) {
                InsertOutcome::Stored => {
                    self.stats.frames_received += 1;
                    self.stats.buffered_frames += 1;
                    FrameDisposition::Buffered(index)
                }
                InsertOutcome::AlreadyPresent => {
                    self.stats.frames_received += 1;
                    self.stats.duplicate_frames += 1;
                    FrameDisposition::Duplicate(index)
                }
                // 보관하지 못한 프레임에 ACK하면 송신자가 재전송을 멈춤
                InsertOutcome::Full => {
                    self.stats.out_of_window_frames += 1;
                    FrameDisposition::OutOfWindow(index)
                }
            });
        }

        self.stats.frames_received += 1;
        self.write_in_order(frame).await?;

        let mut drained = 0;
        while let Some(payload) = self.buffer.pop_if_next(self.expected_index) {
            let next = self.expected_index;
            self.write_payload(next, &payload).await?;
            drained += 1;
        }

        Ok(FrameDisposition::Written { index, drained })
    }

    /// 마지막 인덱스를 넘는 프레임인지
    fn beyond_final(&self, index: u32) -> bool {
        match &self.state {
            SessionState::AwaitingMetadata => false,
            SessionState::Streaming(output) => index > output.final_index,
            SessionState::Complete { .. } => index >= self.expected_index,
        }
    }

    /// 기대 인덱스 프레임 기록 (인덱스 0이면 출력 파일 생성)
    async fn write_in_order(&mut self, frame: DataFrame) -> Result<()> {
        if let Some(metadata) = &frame.metadata {
            self.open_output(metadata).await?;
        }
        self.write_payload(frame.index, &frame.payload).await
    }

    async fn open_output(&mut self, metadata: &FrameMetadata) -> Result<()> {
        let path = resolve_output_path(&self.output_dir, &metadata.filename)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = File::create(&path).await?;

        info!(
            "Receiving {:?}: {} frames, final frame {} bytes",
            path,
            metadata.final_index as u64 + 1,
            metadata.final_payload_len
        );

        self.state = SessionState::Streaming(Output {
            file,
            path,
            final_index: metadata.final_index,
            final_payload_len: metadata.final_payload_len as usize,
        });
        Ok(())
    }

    /// 페이로드 기록 후 기대 인덱스 전진, 마지막 프레임이면 완료 처리
    async fn write_payload(&mut self, index: u32, payload: &[u8]) -> Result<()> {
        let output = match &mut self.state {
            SessionState::Streaming(output) => output,
            _ => {
                return Err(Error::InvalidMetadata(format!(
                    "메타데이터 없이 프레임 {} 기록 시도",
                    index
                )))
            }
        };

        let len = if index == output.final_index {
            output.final_payload_len.min(payload.len())
        } else {
            payload.len()
        };

        output.file.write_all(&payload[..len]).await?;
        output.file.flush().await?;
        self.stats.total_bytes += len as u64;
        self.expected_index += 1;

        if index == output.final_index {
            output.file.sync_all().await?;
            let path = output.path.clone();
            self.state = SessionState::Complete { path };
            self.stats.finish();
        }
        Ok(())
    }
}

/// 출력 디렉터리 안의 경로로 변환 (절대 경로, `..` 등은 거부)
fn resolve_output_path(output_dir: &Path, filename: &str) -> Result<PathBuf> {
    let relative = Path::new(filename);
    let is_plain = relative.components().next().is_some()
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

    if !is_plain {
        return Err(Error::InvalidFilename(filename.to_owned()));
    }
    Ok(output_dir.join(relative))
}

/// 수신 결과
#[derive(Debug, Clone)]
pub struct ReceiveOutcome {
    /// 기록된 파일 경로
    pub path: PathBuf,

    /// 기록한 바이트 수
    pub bytes: u64,

    /// 수신 통계
    pub stats: TransferStats,
}

/// 수신자 (파일 하나를 받고 종료)
pub struct Receiver {
    config: Config,
    socket: UdpSocket,
    session: ReceiverSession,
    /// 첫 유효 프레임을 보낸 주소로 고정
    peer: Option<SocketAddr>,
}

impl Receiver {
    pub fn bind(addr: SocketAddr, output_dir: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let socket = bind_udp(addr, &config)?;
        Ok(Self::with_socket(socket, output_dir, config))
    }

    pub fn with_socket(socket: UdpSocket, output_dir: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            session: ReceiverSession::new(output_dir, config.window_size),
            config,
            socket,
            peer: None,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 파일 하나를 끝까지 수신
    ///
    /// 완료 후 `completion_linger` 동안 프레임이 오지 않으면 반환.
    pub async fn run(mut self) -> Result<ReceiveOutcome> {
        info!("SARQ Receiver listening on {}", self.socket.local_addr()?);

        // 크기가 다른 데이터그램을 걸러내기 위해 1바이트 여유
        let mut buf = vec![0u8; FRAME_SIZE + 1];
        let linger = self.config.completion_linger();

        loop {
            let received = if self.session.is_complete() {
                match time::timeout(linger, self.socket.recv_from(&mut buf)).await {
                    Ok(received) => received,
                    Err(_) => break,
                }
            } else {
                self.socket.recv_from(&mut buf).await
            };

            let (len, from) = match received {
                Ok(received) => received,
                Err(e) => {
                    warn!("수신 에러: {}", e);
                    continue;
                }
            };

            let was_complete = self.session.is_complete();
            let disposition = self.session.handle_datagram(&buf[..len]).await?;

            if let Some(index) = disposition.ack_index() {
                let peer = match self.peer {
                    Some(peer) => peer,
                    None => {
                        info!("Sender locked: {}", from);
                        self.peer = Some(from);
                        from
                    }
                };
                self.send_ack(index, peer).await;
            }

            if !was_complete && self.session.is_complete() {
                info!("Transfer complete: {}", self.session.stats().receiver_summary());
            }
        }

        let path = self
            .session
            .output_path()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(ReceiveOutcome {
            path,
            bytes: self.session.stats().total_bytes,
            stats: self.session.stats().clone(),
        })
    }

    async fn send_ack(&mut self, index: u32, peer: SocketAddr) {
        match self.socket.send_to(&frame::encode_ack(index), peer).await {
            Ok(_) => {
                self.session.stats_mut().acks_sent += 1;
                trace!(index, "ACK 전송");
            }
            // 송신자가 재전송하면 다시 ACK됨
            Err(e) => warn!(index, "ACK 전송 실패: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    use crate::frame::{decode_and_validate_ack, encode_data_frame, first_frame_capacity, TransferPlan};
    use crate::DATA_BYTES;

    fn sample_data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    /// 파일 내용을 와이어 프레임으로 분할
    fn build_frames(data: &[u8], filename: &str) -> Vec<Bytes> {
        let plan = TransferPlan::new(data.len() as u64, filename).unwrap();
        let mut offset = 0;
        (0..=plan.final_index)
            .map(|index| {
                let len = plan.payload_len(index);
                let payload = &data[offset..offset + len];
                offset += len;
                let metadata = (index == 0).then(|| plan.metadata());
                encode_data_frame(index, payload, metadata.as_ref()).unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_in_order_reception() {
        let dir = tempfile::tempdir().unwrap();
        let name = "out.bin";
        let data = sample_data(first_frame_capacity(name.len()) + 2 * DATA_BYTES + 5);
        let frames = build_frames(&data, name);
        assert_eq!(frames.len(), 4);

        let mut session = ReceiverSession::new(dir.path(), 8);
        for (i, frame) in frames.iter().enumerate() {
            let disposition = session.handle_datagram(frame).await.unwrap();
            assert_eq!(
                disposition,
                FrameDisposition::Written {
                    index: i as u32,
                    drained: 0
                }
            );
        }

        assert!(session.is_complete());
        assert_eq!(std::fs::read(dir.path().join(name)).unwrap(), data);
        assert_eq!(session.stats().total_bytes, data.len() as u64);
    }

    #[tokio::test]
    async fn test_reverse_order_drains_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample_data(first_frame_capacity(1) + 3 * DATA_BYTES);
        let frames = build_frames(&data, "r");
        assert_eq!(frames.len(), 4);

        let mut session = ReceiverSession::new(dir.path(), 8);
        for index in (1..4).rev() {
            let disposition = session.handle_datagram(&frames[index]).await.unwrap();
            assert_eq!(disposition, FrameDisposition::Buffered(index as u32));
        }
        assert_eq!(session.buffered(), 3);
        assert!(session.output_path().is_none());

        let disposition = session.handle_datagram(&frames[0]).await.unwrap();
        assert_eq!(disposition, FrameDisposition::Written { index: 0, drained: 3 });
        assert!(session.is_complete());
        assert_eq!(session.buffered(), 0);
        assert_eq!(std::fs::read(dir.path().join("r")).unwrap(), data);
    }

    #[tokio::test]
    async fn test_random_permutations_reassemble() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample_data(first_frame_capacity(1) + 30 * DATA_BYTES + 17);
        let frames = build_frames(&data, "p");
        assert_eq!(frames.len(), 32);

        let mut rng = StdRng::seed_from_u64(0x5A5A);
        for round in 0..8 {
            let mut order: Vec<usize> = (0..frames.len()).collect();
            order.shuffle(&mut rng);

            let output_dir = dir.path().join(round.to_string());
            let mut session = ReceiverSession::new(&output_dir, frames.len());
            for &i in &order {
                let disposition = session.handle_datagram(&frames[i]).await.unwrap();
                assert_eq!(disposition.ack_index(), Some(i as u32));
            }

            assert!(session.is_complete(), "순서 {:?}", order);
            assert_eq!(session.buffered(), 0);
            assert_eq!(std::fs::read(output_dir.join("p")).unwrap(), data);
        }
    }

    #[tokio::test]
    async fn test_frame_not_stored_is_not_acked() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample_data(first_frame_capacity(1) + 5 * DATA_BYTES);
        let frames = build_frames(&data, "n");

        let mut session = ReceiverSession::new(dir.path(), 8);
        session.buffer = ReassemblyBuffer::new(1);

        assert_eq!(
            session.handle_datagram(&frames[2]).await.unwrap(),
            FrameDisposition::Buffered(2)
        );
        let disposition = session.handle_datagram(&frames[3]).await.unwrap();
        assert_eq!(disposition, FrameDisposition::OutOfWindow(3));
        assert_eq!(disposition.ack_index(), None);

        // 이미 보관된 프레임은 가득 차 있어도 중복으로 ACK
        assert_eq!(
            session.handle_datagram(&frames[2]).await.unwrap(),
            FrameDisposition::Duplicate(2)
        );
        assert_eq!(session.stats().out_of_window_frames, 1);
        assert_eq!(session.stats().frames_received, 2);

        // 재전송된 3은 버퍼가 비면 정상 처리
        session.handle_datagram(&frames[0]).await.unwrap();
        session.handle_datagram(&frames[1]).await.unwrap();
        assert_eq!(session.expected_index(), 3);
        assert_eq!(
            session.handle_datagram(&frames[3]).await.unwrap(),
            FrameDisposition::Written { index: 3, drained: 0 }
        );
    }

    #[tokio::test]
    async fn test_duplicates_are_acked_but_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample_data(first_frame_capacity(1) + 3 * DATA_BYTES);
        let frames = build_frames(&data, "d");

        let mut session = ReceiverSession::new(dir.path(), 8);
        session.handle_datagram(&frames[0]).await.unwrap();
        session.handle_datagram(&frames[2]).await.unwrap();

        assert_eq!(
            session.handle_datagram(&frames[0]).await.unwrap(),
            FrameDisposition::Duplicate(0)
        );
        assert_eq!(
            session.handle_datagram(&frames[2]).await.unwrap(),
            FrameDisposition::Duplicate(2)
        );

        session.handle_datagram(&frames[1]).await.unwrap();
        session.handle_datagram(&frames[3]).await.unwrap();
        assert!(session.is_complete());

        // 완료 후 재전송도 ACK 대상
        let disposition = session.handle_datagram(&frames[3]).await.unwrap();
        assert_eq!(disposition.ack_index(), Some(3));
        assert_eq!(session.stats().duplicate_frames, 3);
        assert_eq!(std::fs::read(dir.path().join("d")).unwrap(), data);
    }

    #[tokio::test]
    async fn test_corrupt_and_out_of_window_frames_not_acked() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample_data(first_frame_capacity(1) + 20 * DATA_BYTES);
        let frames = build_frames(&data, "w");

        let mut session = ReceiverSession::new(dir.path(), 4);

        let mut corrupt = frames[0].to_vec();
        corrupt[500] ^= 0x01;
        let disposition = session.handle_datagram(&corrupt).await.unwrap();
        assert_eq!(disposition, FrameDisposition::Corrupt);
        assert_eq!(disposition.ack_index(), None);

        // 잘린 데이터그램
        let disposition = session.handle_datagram(&frames[1][..999]).await.unwrap();
        assert_eq!(disposition, FrameDisposition::Corrupt);

        // 기대 인덱스 0, 윈도우 4 -> 4 이상은 버림
        let disposition = session.handle_datagram(&frames[4]).await.unwrap();
        assert_eq!(disposition, FrameDisposition::OutOfWindow(4));
        assert_eq!(disposition.ack_index(), None);
        assert_eq!(
            session.handle_datagram(&frames[3]).await.unwrap(),
            FrameDisposition::Buffered(3)
        );

        assert_eq!(session.expected_index(), 0);
        assert_eq!(session.stats().corrupt_frames, 2);
        assert_eq!(session.stats().out_of_window_frames, 1);
    }

    #[tokio::test]
    async fn test_frames_beyond_final_index_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample_data(first_frame_capacity(1) + 1);
        let frames = build_frames(&data, "f");
        assert_eq!(frames.len(), 2);

        let mut session = ReceiverSession::new(dir.path(), 16);
        session.handle_datagram(&frames[0]).await.unwrap();

        let stray = encode_data_frame(5, &[1, 2, 3], None).unwrap();
        assert_eq!(
            session.handle_datagram(&stray).await.unwrap(),
            FrameDisposition::OutOfWindow(5)
        );

        session.handle_datagram(&frames[1]).await.unwrap();
        assert!(session.is_complete());
        assert_eq!(std::fs::read(dir.path().join("f")).unwrap(), data);
    }

    #[tokio::test]
    async fn test_single_byte_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();

        for (name, len) in [("one", 1usize), ("empty", 0)] {
            let data = sample_data(len);
            let frames = build_frames(&data, name);
            assert_eq!(frames.len(), 1);

            let mut session = ReceiverSession::new(dir.path(), 4);
            let disposition = session.handle_datagram(&frames[0]).await.unwrap();
            assert_eq!(disposition, FrameDisposition::Written { index: 0, drained: 0 });
            assert!(session.is_complete());
            assert_eq!(std::fs::read(dir.path().join(name)).unwrap(), data);
        }
    }

    #[tokio::test]
    async fn test_unsafe_filenames_rejected() {
        let dir = tempfile::tempdir().unwrap();

        for name in ["../escape", "/etc/passwd", "a/../../b", "."] {
            let frames = build_frames(b"x", name);
            let mut session = ReceiverSession::new(dir.path(), 4);
            let result = session.handle_datagram(&frames[0]).await;
            assert!(
                matches!(result, Err(Error::InvalidFilename(_))),
                "{:?} 허용됨",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_nested_filename_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let frames = build_frames(b"nested", "sub/dir/file.txt");

        let mut session = ReceiverSession::new(dir.path(), 4);
        session.handle_datagram(&frames[0]).await.unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("sub/dir/file.txt")).unwrap(),
            b"nested"
        );
    }

    #[tokio::test]
    async fn test_receiver_acks_to_locked_peer() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new()
            .with_window_size(4)
            .with_completion_linger(std::time::Duration::from_millis(50));
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let receiver = Receiver::with_socket(socket, dir.path(), config);
        let addr = receiver.local_addr().unwrap();
        let handle = tokio::spawn(receiver.run());

        let data = sample_data(first_frame_capacity(4) + 10);
        let frames = build_frames(&data, "peer");
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut buf = [0u8; 64];

        for (i, frame) in frames.iter().enumerate() {
            sender.send_to(frame, addr).await.unwrap();
            let (len, _) = sender.recv_from(&mut buf).await.unwrap();
            assert_eq!(decode_and_validate_ack(&buf[..len]).unwrap(), i as u32);
        }

        let outcome = time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcome.path, dir.path().join("peer"));
        assert_eq!(outcome.stats.acks_sent, 2);
        assert_eq!(outcome.bytes, data.len() as u64);
        assert_eq!(std::fs::read(&outcome.path).unwrap(), data);
    }
}
