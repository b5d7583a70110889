//! 実行フラグで中断できる有界チャネル
//!
//! 送受信はブロッキングだが、一定間隔で実行フラグを確認するので
//! 停止要求後にワーカーが永久に待ち続けることはない。

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::PipelineError;

/// ブロッキング操作が実行フラグを確認する間隔
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// パイプライン全体の実行フラグ
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// 停止済みなら `Stopped` を返す
    pub fn check(&self) -> Result<(), PipelineError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(PipelineError::Stopped)
        }
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

pub struct HandoffSender<T> {
    tx: Sender<T>,
    running: RunFlag,
}

// 複数の送り手（追跡経路と検出経路）が同じ受け手に流し込むため
impl<T> Clone for HandoffSender<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone(), running: self.running.clone() }
    }
}

pub struct HandoffReceiver<T> {
    rx: Receiver<T>,
    running: RunFlag,
}

/// 容量 `capacity` のハンドオフチャネル。ステージ間は常に1
pub fn handoff<T>(capacity: usize, running: &RunFlag) -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = bounded(capacity);
    (
        HandoffSender { tx, running: running.clone() },
        HandoffReceiver { rx, running: running.clone() },
    )
}

impl<T> HandoffSender<T> {
    /// 空きができるまで待って送る
    pub fn send(&self, mut item: T) -> Result<(), PipelineError> {
        loop {
            self.running.check()?;
            match self.tx.send_timeout(item, POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(back)) => item = back,
                Err(SendTimeoutError::Disconnected(_)) => return Err(PipelineError::Disconnected),
            }
        }
    }
}

impl<T> HandoffReceiver<T> {
    /// 次の要素が届くまで待つ
    pub fn recv(&self) -> Result<T, PipelineError> {
        loop {
            self.running.check()?;
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(item) => return Ok(item),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(PipelineError::Disconnected),
            }
        }
    }
}
