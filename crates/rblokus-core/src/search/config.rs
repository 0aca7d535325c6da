//! 探索設定（SearchConfig）

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tree::Tree;
use crate::types::Float;

/// 設定エラー
///
/// 不正な設定は探索を走らせる前に構築時点で弾く。
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// 探索エンジンの設定
///
/// 1 回の探索に対する制限（シミュレーション数・時間）は `SearchLimits`。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// ワーカースレッド数
    pub nu_threads: usize,

    /// ツリー用メモリ（バイト）。2 本のツリーで分け合う
    pub tree_memory: usize,

    /// UCT バイアス項の定数
    pub bias_term_constant: Float,

    /// ノードを展開する最小 visit カウント
    pub expand_threshold: Float,

    /// in-tree で 1 手進むごとの展開閾値の増分
    pub expand_threshold_inc: Float,

    /// 完全な子選択を行う間隔
    ///
    /// 親のカウントが大きいノードでは選択結果がほぼ変わらないため、
    /// `full_select_min` を超えるノードでは前回のパスを interval 回に
    /// 1 回だけ選択し直す。1 なら常に完全選択。
    pub full_select_interval: u32,

    /// 完全選択スキップを適用する最小ノードカウント
    pub full_select_min: Float,

    /// 決定的モード
    ///
    /// 高コストな中断チェックを壁時計ではなく固定シミュレーション間隔で
    /// 行う。マルチスレッド時はロックフリー更新自体が非決定的なので、
    /// このフラグでも結果は再現しない（シングルスレッドでのみ再現）。
    pub deterministic: bool,

    /// 前回探索の後続局面ならサブツリーを再利用する
    pub reuse_subtree: bool,

    /// 前回探索と同一局面ならツリー全体を再利用する
    pub reuse_tree: bool,

    /// 枝刈り開始時の最小カウント閾値
    ///
    /// prior 初期化のカウントより大きい値にしておくこと。
    pub prune_count_start: Float,

    /// RAVE を使う
    pub rave: bool,

    /// RAVE を適用する親ノードの最大 visit カウント
    pub rave_parent_max: Float,

    /// RAVE を適用する子ノードの最大値カウント
    pub rave_child_max: Float,

    /// RAVE 擬似観測の重み
    pub rave_weight: Float,

    /// RAVE の距離重み付けを使う
    ///
    /// 重みはシミュレーション中の出現位置までの距離に応じて線形に
    /// `rave_dist_final` まで減衰する。
    pub rave_dist_weighting: bool,

    /// 距離重み付けの終端重み
    pub rave_dist_final: Float,

    /// 同じ指し手を相手が先に打っていたら RAVE 更新しない
    pub rave_check_same: bool,

    /// マルチスレッド時に virtual loss を使う
    pub virtual_loss: bool,

    /// Last-Good-Reply ヒューリスティックを使う
    pub use_lgr: bool,

    /// LGR ハッシュテーブルのエントリ数（use_lgr 時は 0 不可）
    pub lgr_hash_table_size: usize,

    /// 最善手が変わり得ないときの早期終了を使う
    pub use_unlikely_change: bool,

    /// 展開時の子ノードの最小 prior カウント
    pub child_min_count: Float,

    /// 引き分け相当の評価値（50% 勝率）
    pub tie_value: Float,

    /// 期待シミュレーション毎秒
    ///
    /// 決定的モードでの中断チェック間隔の決定などに使う。低めの値ほど
    /// チェックが増え、高めの値ほど打ち切りが遅れる。
    pub expected_sim_per_sec: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            nu_threads: 1,
            tree_memory: 256_000_000,
            bias_term_constant: 0.45,
            expand_threshold: 0.0,
            expand_threshold_inc: 0.0,
            full_select_interval: 1,
            full_select_min: Float::MAX,
            deterministic: false,
            reuse_subtree: true,
            reuse_tree: false,
            prune_count_start: 16.0,
            rave: false,
            rave_parent_max: 50_000.0,
            rave_child_max: 2_000.0,
            rave_weight: 0.3,
            rave_dist_weighting: false,
            rave_dist_final: 0.0,
            rave_check_same: false,
            virtual_loss: false,
            use_lgr: false,
            lgr_hash_table_size: 0,
            use_unlikely_change: true,
            child_min_count: 0.0,
            tie_value: 0.5,
            expected_sim_per_sec: 100.0,
        }
    }
}

impl SearchConfig {
    /// 設定の検証（構築時に呼ぶ）
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.nu_threads == 0 {
            return Err(SearchError::InvalidConfig(
                "nu_threads must be at least 1".to_string(),
            ));
        }
        let min_memory = 2 * (self.nu_threads + 2) * Tree::NODE_SIZE;
        if self.tree_memory < min_memory {
            return Err(SearchError::InvalidConfig(format!(
                "tree_memory {} is below the minimum {min_memory} for {} threads",
                self.tree_memory, self.nu_threads
            )));
        }
        if self.use_lgr && self.lgr_hash_table_size == 0 {
            return Err(SearchError::InvalidConfig(
                "lgr_hash_table_size must be greater 0 if use_lgr is set".to_string(),
            ));
        }
        if self.expected_sim_per_sec <= 0.0 {
            return Err(SearchError::InvalidConfig(
                "expected_sim_per_sec must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// メモリバジェットから 1 ツリーあたりの最大ノード数を求める
    ///
    /// メモリは 2 本のツリー（本体と再利用・枝刈り用）で分け合う。
    pub fn max_nodes(&self) -> usize {
        let max_nodes = self.tree_memory / Tree::NODE_SIZE / 2;
        // 子範囲のパック表現で扱えるインデックスに収める
        max_nodes.min(u32::MAX as usize)
    }
}
