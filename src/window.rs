//! 송신측 슬라이딩 윈도우
//!
//! - 고정 크기 원형 버퍼 (`window_size + 1` 슬롯, 한 칸은 full/empty 구분용)
//! - 선택적 ACK 기록, 앞쪽 연속 구간이 모두 ACK되면 한 번에 해제
//! - `last_consecutive_acked`로 재전송 타이머의 O(1) 확인

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{Error, Result};

/// 윈도우 슬롯
#[derive(Debug, Clone)]
struct WindowEntry {
    index: u32,
    frame: Bytes,
    acked: bool,
}

/// `ack` 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// 가장 오래된 프레임부터 `freed`개 해제됨
    Advanced { freed: usize },

    /// 윈도우 안의 뒤쪽 프레임을 ACK로 표시만 함
    Selective,

    /// 윈도우 범위 밖 (중복 또는 오래된 ACK)
    Ignored,
}

/// 슬라이딩 윈도우 (단일 스레드용, 공유는 [`SharedWindow`])
#[derive(Debug)]
pub struct SlidingWindow {
    slots: Vec<Option<WindowEntry>>,
    /// 가장 오래된 미해제 프레임 위치
    head: usize,
    /// 다음 추가 위치
    tail: usize,
    last_consecutive_acked: Option<u32>,
}

impl SlidingWindow {
    pub fn new(window_size: usize) -> Self {
        Self {
            slots: vec![None; window_size.max(1) + 1],
            head: 0,
            tail: 0,
            last_consecutive_acked: None,
        }
    }

    /// 최대 in-flight 프레임 수
    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn is_full(&self) -> bool {
        (self.tail + 1) % self.slots.len() == self.head
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// 해제되지 않은 프레임 수
    pub fn size(&self) -> usize {
        if self.tail < self.head {
            self.slots.len() + self.tail - self.head
        } else {
            self.tail - self.head
        }
    }

    /// 앞쪽부터 연속으로 ACK되어 해제된 마지막 인덱스
    pub fn last_consecutive_acked(&self) -> Option<u32> {
        self.last_consecutive_acked
    }

    /// 프레임 추가 (호출자가 `is_full`로 먼저 확인해야 함)
    pub fn add(&mut self, index: u32, frame: Bytes) -> Result<()> {
        if self.is_full() {
            return Err(Error::WindowFull {
                capacity: self.capacity(),
            });
        }
        self.slots[self.tail] = Some(WindowEntry {
            index,
            frame,
            acked: false,
        });
        self.tail = (self.tail + 1) % self.slots.len();
        Ok(())
    }

    fn head_index(&self) -> Option<u32> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.head].as_ref().map(|entry| entry.index)
    }

    /// 윈도우 시작점으로부터의 거리 (범위 밖이면 None)
    fn offset_of(&self, index: u32) -> Option<usize> {
        let head = self.head_index()?;
        let diff = index.checked_sub(head)? as usize;
        (diff < self.size()).then_some(diff)
    }

    /// ACK 처리
    pub fn ack(&mut self, index: u32) -> AckOutcome {
        let offset = match self.offset_of(index) {
            Some(offset) => offset,
            None => return AckOutcome::Ignored,
        };

        let slot = (self.head + offset) % self.slots.len();
        if let Some(entry) = self.slots[slot].as_mut() {
            entry.acked = true;
        }
        if offset > 0 {
            return AckOutcome::Selective;
        }

        // 앞쪽 연속 ACK 구간 해제
        let mut freed = 0;
        while !self.is_empty() {
            match self.slots[self.head].as_ref() {
                Some(entry) if entry.acked => {
                    self.last_consecutive_acked = Some(entry.index);
                }
                _ => break,
            }
            self.slots[self.head] = None;
            self.head = (self.head + 1) % self.slots.len();
            freed += 1;
        }
        AckOutcome::Advanced { freed }
    }

    /// 재전송 중단 여부 판단용
    pub fn is_acked(&self, index: u32) -> bool {
        if matches!(self.last_consecutive_acked, Some(last) if index <= last) {
            return true;
        }
        match self.head_index() {
            // 윈도우보다 앞은 이미 해제된 프레임
            Some(head) if index < head => true,
            Some(_) => self
                .offset_of(index)
                .and_then(|offset| self.slots[(self.head + offset) % self.slots.len()].as_ref())
                .map_or(false, |entry| entry.acked),
            None => false,
        }
    }

    /// 아직 ACK되지 않은 프레임의 바이트 (ACK됐거나 해제됐으면 None)
    pub fn pending_frame(&self, index: u32) -> Option<Bytes> {
        let offset = self.offset_of(index)?;
        self.slots[(self.head + offset) % self.slots.len()]
            .as_ref()
            .filter(|entry| !entry.acked)
            .map(|entry| entry.frame.clone())
    }
}

/// 송신 메인 태스크와 재전송 태스크가 공유하는 윈도우
///
/// 각 호출은 서로 배타적이지만 호출 사이의 원자성은 보장하지 않음.
#[derive(Debug)]
pub struct SharedWindow {
    inner: Mutex<SlidingWindow>,
}

impl SharedWindow {
    pub fn new(window_size: usize) -> Self {
        Self {
            inner: Mutex::new(SlidingWindow::new(window_size)),
        }
    }

    pub fn is_full(&self) -> bool {
        self.inner.lock().is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn size(&self) -> usize {
        self.inner.lock().size()
    }

    pub fn last_consecutive_acked(&self) -> Option<u32> {
        self.inner.lock().last_consecutive_acked()
    }

    pub fn add(&self, index: u32, frame: Bytes) -> Result<()> {
        self.inner.lock().add(index, frame)
    }

    pub fn ack(&self, index: u32) -> AckOutcome {
        self.inner.lock().ack(index)
    }

    pub fn is_acked(&self, index: u32) -> bool {
        self.inner.lock().is_acked(index)
    }

    pub fn pending_frame(&self, index: u32) -> Option<Bytes> {
        self.inner.lock().pending_frame(index)
    }
}
