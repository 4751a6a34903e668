//! 프레임 코덱
//!
//! ```text
//! [0..8]    CRC32 (u64 BE, 상위 4바이트는 0) - 이후 전체 바이트에 대한 체크섬
//! [8..12]   시퀀스 인덱스 (u32 BE)
//! --- 인덱스 0 프레임만 ---
//! [12..16]  마지막 프레임 인덱스 (u32 BE)
//! [16..20]  마지막 프레임 페이로드 길이 (u32 BE)
//! [20..22]  파일 이름 길이 (u16 BE)
//! [22..]    파일 이름 (UTF-8)
//! ---
//! [..1000]  페이로드 (남는 부분은 0으로 채움)
//! ```
//!
//! ACK 프레임: `[0..8]` CRC32, `[8..12]` ACK 대상 인덱스.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    Error, Result, ACK_SIZE, CHECKSUM_BYTES, DATA_BYTES, FRAME_SIZE, HEADER_BYTES,
    METADATA_BYTES,
};

/// 첫 프레임에 담을 수 있는 파일 이름의 최대 길이
pub const MAX_FILENAME_LEN: usize = DATA_BYTES - METADATA_BYTES;

/// 와이어 상의 인덱스는 부호 있는 32비트 정수와 호환되어야 함
const MAX_INDEX: u32 = i32::MAX as u32;

/// 첫 프레임 메타데이터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    /// 마지막 프레임의 인덱스 (와이어 필드 이름은 total_frame_count)
    pub final_index: u32,

    /// 마지막 프레임에서 유효한 페이로드 길이
    pub final_payload_len: u32,

    /// 수신측에 생성할 파일 이름
    pub filename: String,
}

/// 디코딩된 데이터 프레임
#[derive(Debug, Clone)]
pub struct DataFrame {
    /// 시퀀스 인덱스
    pub index: u32,

    /// 인덱스 0 프레임에만 존재
    pub metadata: Option<FrameMetadata>,

    /// 페이로드 영역 전체 (마지막 프레임이면 0 패딩 포함, 잘라내기는 수신측 몫)
    pub payload: Bytes,
}

/// 파일 이름 길이에 따른 첫 프레임의 페이로드 용량
pub fn first_frame_capacity(filename_len: usize) -> usize {
    MAX_FILENAME_LEN.saturating_sub(filename_len)
}

/// CRC32 계산 (IEEE 802.3 다항식)
#[inline]
pub fn checksum(data: &[u8]) -> u64 {
    crc32fast::hash(data) as u64
}

fn verify_checksum(datagram: &[u8]) -> Result<()> {
    let stored = (&datagram[..CHECKSUM_BYTES]).get_u64();
    let computed = checksum(&datagram[CHECKSUM_BYTES..]);
    if stored != computed {
        return Err(Error::CrcMismatch {
            expected: stored,
            got: computed,
        });
    }
    Ok(())
}

fn seal(mut buf: BytesMut) -> Bytes {
    let crc = checksum(&buf[CHECKSUM_BYTES..]);
    buf[..CHECKSUM_BYTES].copy_from_slice(&crc.to_be_bytes());
    buf.freeze()
}

/// 데이터 프레임 인코딩
///
/// 인덱스 0 프레임은 반드시 메타데이터를 가져야 하고, 나머지는 가지면 안 됨.
/// 체크섬은 다른 필드를 모두 채운 뒤 마지막에 기록.
pub fn encode_data_frame(
    index: u32,
    payload: &[u8],
    metadata: Option<&FrameMetadata>,
) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(FRAME_SIZE);
    buf.put_u64(0);
    buf.put_u32(index);

    let capacity = match (index, metadata) {
        (0, Some(meta)) => {
            let name = meta.filename.as_bytes();
            if name.len() > MAX_FILENAME_LEN {
                return Err(Error::FilenameTooLong {
                    len: name.len(),
                    max: MAX_FILENAME_LEN,
                });
            }
            buf.put_u32(meta.final_index);
            buf.put_u32(meta.final_payload_len);
            buf.put_u16(name.len() as u16);
            buf.put_slice(name);
            first_frame_capacity(name.len())
        }
        (0, None) => {
            return Err(Error::InvalidMetadata("인덱스 0 프레임에 메타데이터 없음".into()));
        }
        (_, Some(_)) => {
            return Err(Error::InvalidMetadata(format!(
                "인덱스 {} 프레임에 메타데이터 지정",
                index
            )));
        }
        (_, None) => DATA_BYTES,
    };

    if payload.len() > capacity {
        return Err(Error::PayloadTooLarge {
            capacity,
            got: payload.len(),
        });
    }

    buf.put_slice(payload);
    buf.resize(FRAME_SIZE, 0);
    Ok(seal(buf))
}

/// 데이터 프레임 디코딩 + 체크섬 검증
///
/// 길이 불일치, CRC 불일치, 메타데이터 불일치는 모두 에러.
/// 호출자는 에러 프레임을 조용히 폐기 (NACK 없음).
pub fn decode_and_validate(datagram: &[u8]) -> Result<DataFrame> {
    if datagram.len() != FRAME_SIZE {
        return Err(Error::InvalidFrameSize {
            expected: FRAME_SIZE,
            got: datagram.len(),
        });
    }
    verify_checksum(datagram)?;

    let mut cursor = &datagram[CHECKSUM_BYTES..];
    let index = cursor.get_u32();
    if index > MAX_INDEX {
        return Err(Error::InvalidMetadata(format!("음수 인덱스: {}", index as i32)));
    }

    if index != 0 {
        return Ok(DataFrame {
            index,
            metadata: None,
            payload: Bytes::copy_from_slice(&datagram[HEADER_BYTES..]),
        });
    }

    let final_index = cursor.get_u32();
    let final_payload_len = cursor.get_u32();
    let name_len = cursor.get_u16() as usize;

    if final_index > MAX_INDEX {
        return Err(Error::InvalidMetadata(format!(
            "음수 프레임 수: {}",
            final_index as i32
        )));
    }
    if name_len > MAX_FILENAME_LEN {
        return Err(Error::InvalidMetadata(format!(
            "파일 이름 길이 초과: {}",
            name_len
        )));
    }

    let capacity = if final_index == 0 {
        first_frame_capacity(name_len)
    } else {
        DATA_BYTES
    };
    if final_payload_len as usize > capacity {
        return Err(Error::InvalidMetadata(format!(
            "마지막 프레임 길이 {} > 용량 {}",
            final_payload_len, capacity
        )));
    }

    let filename = std::str::from_utf8(&cursor[..name_len])
        .map_err(|e| Error::InvalidMetadata(format!("파일 이름 UTF-8 아님: {}", e)))?
        .to_owned();
    let payload_start = HEADER_BYTES + METADATA_BYTES + name_len;

    Ok(DataFrame {
        index,
        metadata: Some(FrameMetadata {
            final_index,
            final_payload_len,
            filename,
        }),
        payload: Bytes::copy_from_slice(&datagram[payload_start..]),
    })
}

/// ACK 프레임 인코딩
pub fn encode_ack(index: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(ACK_SIZE);
    buf.put_u64(0);
    buf.put_u32(index);
    seal(buf)
}

/// ACK 프레임 디코딩 + 체크섬 검증, ACK 대상 인덱스 반환
pub fn decode_and_validate_ack(datagram: &[u8]) -> Result<u32> {
    if datagram.len() != ACK_SIZE {
        return Err(Error::InvalidFrameSize {
            expected: ACK_SIZE,
            got: datagram.len(),
        });
    }
    verify_checksum(datagram)?;
    Ok((&datagram[CHECKSUM_BYTES..]).get_u32())
}

/// 전송 계획
///
/// 파일 길이와 첫 프레임 메타데이터 크기로 프레임 분할을 결정.
/// 인덱스는 `0..=final_index`, 파일 전체가 첫 프레임에 들어가면 `final_index == 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    /// 원본 파일 길이
    pub file_len: u64,

    /// 수신측 파일 이름
    pub filename: String,

    /// 첫 프레임에 실리는 파일 바이트 수
    pub first_payload_len: usize,

    /// 마지막 프레임 인덱스
    pub final_index: u32,

    /// 마지막 프레임 페이로드 길이
    pub final_payload_len: usize,
}

impl TransferPlan {
    pub fn new(file_len: u64, filename: &str) -> Result<Self> {
        if filename.is_empty() {
            return Err(Error::InvalidFilename(filename.to_owned()));
        }
        if filename.len() > MAX_FILENAME_LEN {
            return Err(Error::FilenameTooLong {
                len: filename.len(),
                max: MAX_FILENAME_LEN,
            });
        }

        let first_capacity = first_frame_capacity(filename.len()) as u64;
        if file_len <= first_capacity {
            return Ok(Self {
                file_len,
                filename: filename.to_owned(),
                first_payload_len: file_len as usize,
                final_index: 0,
                final_payload_len: file_len as usize,
            });
        }

        let remaining = file_len - first_capacity;
        let data_bytes = DATA_BYTES as u64;
        let frames_after_first = (remaining + data_bytes - 1) / data_bytes;
        if frames_after_first > MAX_INDEX as u64 {
            return Err(Error::FileTooLarge { len: file_len });
        }

        Ok(Self {
            file_len,
            filename: filename.to_owned(),
            first_payload_len: first_capacity as usize,
            final_index: frames_after_first as u32,
            final_payload_len: (remaining - (frames_after_first - 1) * data_bytes) as usize,
        })
    }

    /// 프레임 하나로 끝나는 전송인지
    pub fn is_single_frame(&self) -> bool {
        self.final_index == 0
    }

    /// 전체 프레임 수
    pub fn frame_count(&self) -> u64 {
        self.final_index as u64 + 1
    }

    /// 인덱스별 파일 바이트 수
    pub fn payload_len(&self, index: u32) -> usize {
        if index == 0 {
            self.first_payload_len
        } else if index == self.final_index {
            self.final_payload_len
        } else {
            DATA_BYTES
        }
    }

    /// 첫 프레임 메타데이터
    pub fn metadata(&self) -> FrameMetadata {
        FrameMetadata {
            final_index: self.final_index,
            final_payload_len: self.final_payload_len as u32,
            filename: self.filename.clone(),
        }
    }
}
