//! # SARQ (Selective ARQ)
//!
//! UDP 기반 슬라이딩 윈도우 파일 전송 프로토콜
//!
//! ## 핵심 특징
//! - **고정 크기 프레임**: 1000바이트 데이터 프레임, 12바이트 ACK
//! - **CRC32 무결성 검사**: 손상된 프레임은 조용히 폐기 (NACK 없음)
//! - **선택적 ACK**: 수신한 프레임마다 개별 ACK, 누적은 송신측 윈도우가 재구성
//! - **프레임별 재전송 타이머**: ACK될 때까지 고정 주기로 재전송
//! - **순서 재조립**: 순서가 어긋난 프레임은 버퍼링 후 연속 구간이 생기면 기록
//! - **고정 윈도우**: 혼잡 제어 없이 in-flight 프레임 수만 제한

pub mod config;
pub mod error;
pub mod frame;
pub mod reassembly;
pub mod receiver;
pub mod relay;
pub mod sender;
pub mod socket;
pub mod stats;
pub mod window;

pub use config::Config;
pub use error::{Error, Result};
pub use frame::{DataFrame, FrameMetadata, TransferPlan};
pub use reassembly::ReassemblyBuffer;
pub use receiver::{FrameDisposition, ReceiveOutcome, Receiver, ReceiverSession};
pub use relay::{LossyRelay, RelayConfig};
pub use sender::Sender;
pub use stats::TransferStats;
pub use window::{AckOutcome, SharedWindow, SlidingWindow};

/// 데이터 프레임 크기 (바이트)
pub const FRAME_SIZE: usize = 1000;

/// ACK 프레임 크기 (바이트)
pub const ACK_SIZE: usize = 12;

/// 체크섬 필드 크기 (CRC32를 8바이트로 확장)
pub const CHECKSUM_BYTES: usize = 8;

/// 시퀀스 인덱스 필드 크기
pub const INDEX_BYTES: usize = 4;

/// 일반 프레임 헤더 크기 (체크섬 + 인덱스)
pub const HEADER_BYTES: usize = CHECKSUM_BYTES + INDEX_BYTES;

/// 첫 프레임 메타데이터 고정부 크기 (프레임 수 4 + 마지막 길이 4 + 이름 길이 2)
pub const METADATA_BYTES: usize = 10;

/// 일반 프레임의 페이로드 용량
pub const DATA_BYTES: usize = FRAME_SIZE - HEADER_BYTES;

/// 기본 윈도우 크기 (프레임)
pub const DEFAULT_WINDOW_SIZE: usize = 1 << 12;

/// 기본 재전송 주기 (밀리초)
pub const DEFAULT_RETRANSMIT_INTERVAL_MS: u64 = 40;
