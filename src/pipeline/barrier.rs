use std::sync::{Condvar, Mutex, PoisonError};

use super::channel::{RunFlag, POLL_INTERVAL};
use crate::error::PipelineError;

/// 世代カウンタ付きのバリア
///
/// カメラタスクはフレームを出す前に現在の世代を読み、
/// 世代が進むまで待つ。消費側は全カメラ分を受け取ったら `release` で世代を進める。
/// 世代を先に読んでおくので、解放が待機より先に起きても取りこぼさない。
#[derive(Debug, Default)]
pub struct GenerationBarrier {
    generation: Mutex<u64>,
    released: Condvar,
}

impl GenerationBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        *self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 世代が `seen` から進むまで待つ
    pub fn wait_past(&self, seen: u64, running: &RunFlag) -> Result<(), PipelineError> {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        while *generation == seen {
            running.check()?;
            generation = self
                .released
                .wait_timeout(generation, POLL_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Ok(())
    }

    /// 待機中の全タスクを次のラウンドへ進める
    pub fn release(&self) {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        self.released.notify_all();
    }
}
