//! パイプラインのエラー型
//!
//! 致命的なエラー (`PipelineError`) はプロセスを終了させる。
//! ラウンド単位の破棄 (`DropReason`) は回復可能で、次のラウンドへ進む。

use thiserror::Error;

/// 致命的エラー（ワーカーを停止させる）
#[derive(Error, Debug)]
pub enum PipelineError {
    /// カメラ読み込み失敗。ステレオ対応が崩れるので続行しない
    #[error("camera {camera} failed: {source:#}")]
    Camera {
        camera: usize,
        #[source]
        source: anyhow::Error,
    },

    /// 推論エンジンの失敗。ランタイム状態を修復できないため致命的扱い
    #[error("inference failed: {0:#}")]
    Inference(anyhow::Error),

    /// 画像処理プリミティブの失敗
    #[error("vision primitive failed: {0:#}")]
    Vision(anyhow::Error),

    /// カメラ台数とキャリブレーションの食い違いなど
    #[error("invalid pipeline setup: {0}")]
    Setup(String),

    /// ワーカースレッドの起動失敗
    #[error("failed to spawn worker {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// ワーカースレッドがpanicした
    #[error("worker {0} panicked")]
    Panicked(String),

    /// 隣接ステージが終了してチャネルが切断された
    #[error("pipeline channel disconnected")]
    Disconnected,

    /// 実行フラグが下ろされた（正常停止）
    #[error("pipeline stopped")]
    Stopped,
}

impl PipelineError {
    /// 停止要求・切断由来で、エラーとして報告する必要がないか
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Stopped | Self::Disconnected)
    }
}

/// ラウンドを丸ごと破棄する理由
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DropReason {
    #[error("no subject detected on camera {camera}")]
    NoDetection { camera: usize },

    #[error("degenerate region on camera {camera}")]
    DegenerateRegion { camera: usize },

    #[error("landmark presence {score:.3} below threshold on camera {camera}")]
    LowPresence { camera: usize, score: f32 },

    #[error("round {round} arrived after round {latest}")]
    OutOfOrder { round: u64, latest: u64 },
}

/// ゲートの結果: 次段へ進むか、ラウンドを破棄するか
#[derive(Debug)]
pub enum RoundOutcome<T> {
    Continue(T),
    Drop(DropReason),
}

impl<T> RoundOutcome<T> {
    pub fn is_drop(&self) -> bool {
        matches!(self, Self::Drop(_))
    }

    pub fn continued(self) -> Option<T> {
        match self {
            Self::Continue(v) => Some(v),
            Self::Drop(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_errors() {
        assert!(PipelineError::Stopped.is_shutdown());
        assert!(PipelineError::Disconnected.is_shutdown());
        assert!(!PipelineError::Inference(anyhow::anyhow!("boom")).is_shutdown());
    }

    #[test]
    fn test_drop_reason_display() {
        let reason = DropReason::LowPresence { camera: 1, score: 0.25 };
        assert_eq!(
            reason.to_string(),
            "landmark presence 0.250 below threshold on camera 1"
        );
    }

    #[test]
    fn test_round_outcome_continued() {
        let ok: RoundOutcome<u32> = RoundOutcome::Continue(3);
        assert!(!ok.is_drop());
        assert_eq!(ok.continued(), Some(3));

        let dropped: RoundOutcome<u32> = RoundOutcome::Drop(DropReason::NoDetection { camera: 0 });
        assert!(dropped.is_drop());
        assert_eq!(dropped.continued(), None);
    }
}
