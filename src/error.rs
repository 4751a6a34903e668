//! 에러 타입 정의

use thiserror::Error;

/// SARQ 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("프레임 크기 불일치: expected {expected}, got {got}")]
    InvalidFrameSize { expected: usize, got: usize },

    #[error("CRC 불일치: expected {expected:016X}, got {got:016X}")]
    CrcMismatch { expected: u64, got: u64 },

    #[error("잘못된 메타데이터: {0}")]
    InvalidMetadata(String),

    #[error("페이로드 초과: 최대 {capacity} bytes, got {got}")]
    PayloadTooLarge { capacity: usize, got: usize },

    #[error("파일 이름이 첫 프레임에 들어가지 않음: {len} bytes (최대 {max})")]
    FilenameTooLong { len: usize, max: usize },

    #[error("허용되지 않는 파일 이름: {0:?}")]
    InvalidFilename(String),

    #[error("파일이 너무 큼: {len} bytes")]
    FileTooLarge { len: u64 },

    #[error("윈도우 가득 참: capacity={capacity}")]
    WindowFull { capacity: usize },

    #[error("주소 해석 실패: {0}")]
    AddressResolution(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
