//! MCTS 探索エンジン
//!
//! - `engine`: 4 フェーズのシミュレーションループとオーケストレーション
//! - `config` / `limits`: 設定と 1 探索あたりの打ち切り条件
//! - `bias`: UCT バイアス項
//! - `interval`: 高コストチェックの間引き
//! - `lgr`: Last-Good-Reply ヒューリスティック
//! - `state`: ゲーム状態の契約（GameState）
//! - `thread`: 長寿命ワーカースレッド

mod bias;
mod config;
mod engine;
mod interval;
mod lgr;
mod limits;
mod state;
mod thread;

pub use bias::BiasTerm;
pub use config::{SearchConfig, SearchError};
pub use engine::{ProgressCallback, Search};
pub use interval::{IntervalChecker, TimeIntervalChecker};
pub use lgr::LastGoodReply;
pub use limits::SearchLimits;
pub use state::{Eval, GameState, Simulation, MAX_PLAYERS};
