//! 수신측 재조립 버퍼
//!
//! 기대 인덱스보다 앞서 도착한 프레임을 인덱스 순으로 보관.
//! 연속 구간이 이어지면 가장 작은 인덱스부터 꺼내 기록.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use bytes::Bytes;

/// `insert` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// 새로 보관함
    Stored,

    /// 같은 인덱스가 이미 있음
    AlreadyPresent,

    /// 버퍼가 가득 차서 보관하지 못함
    Full,
}

/// 인덱스 순 정렬 버퍼 (최대 `capacity`개)
#[derive(Debug)]
pub struct ReassemblyBuffer {
    frames: BTreeMap<u32, Bytes>,
    capacity: usize,
}

impl ReassemblyBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: BTreeMap::new(),
            capacity,
        }
    }

    /// 프레임 보관 (중복 확인이 용량 확인보다 먼저)
    pub fn insert(&mut self, index: u32, payload: Bytes) -> InsertOutcome {
        let full = self.frames.len() >= self.capacity;
        match self.frames.entry(index) {
            Entry::Occupied(_) => InsertOutcome::AlreadyPresent,
            Entry::Vacant(_) if full => InsertOutcome::Full,
            Entry::Vacant(slot) => {
                slot.insert(payload);
                InsertOutcome::Stored
            }
        }
    }

    /// 가장 작은 인덱스
    pub fn peek_min(&self) -> Option<u32> {
        self.frames.keys().next().copied()
    }

    /// 가장 작은 인덱스가 `expected`일 때만 꺼냄
    pub fn pop_if_next(&mut self, expected: u32) -> Option<Bytes> {
        if self.peek_min()? != expected {
            return None;
        }
        self.frames.pop_first().map(|(_, payload)| payload)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drains_in_index_order() {
        let mut buffer = ReassemblyBuffer::new(8);
        for index in [5u32, 3, 4, 7] {
            assert_eq!(
                buffer.insert(index, Bytes::from(vec![index as u8])),
                InsertOutcome::Stored
            );
        }

        assert_eq!(buffer.peek_min(), Some(3));
        assert!(buffer.pop_if_next(2).is_none());

        let mut expected = 3;
        while let Some(payload) = buffer.pop_if_next(expected) {
            assert_eq!(payload.as_ref(), &[expected as u8]);
            expected += 1;
        }

        // 6이 빠져서 7은 남아 있어야 함
        assert_eq!(expected, 6);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.peek_min(), Some(7));
    }

    #[test]
    fn test_duplicate_and_full_are_distinguished() {
        let mut buffer = ReassemblyBuffer::new(2);
        assert_eq!(buffer.insert(1, Bytes::from_static(b"a")), InsertOutcome::Stored);
        assert_eq!(
            buffer.insert(1, Bytes::from_static(b"b")),
            InsertOutcome::AlreadyPresent
        );
        assert_eq!(buffer.insert(2, Bytes::new()), InsertOutcome::Stored);

        // 가득 찬 상태에서도 이미 있는 인덱스는 중복으로 보고
        assert_eq!(buffer.insert(2, Bytes::new()), InsertOutcome::AlreadyPresent);
        assert_eq!(buffer.insert(3, Bytes::new()), InsertOutcome::Full);

        assert_eq!(buffer.pop_if_next(1).unwrap().as_ref(), b"a");
        assert!(!buffer.is_empty());
    }
}
