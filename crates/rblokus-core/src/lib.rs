//! rblokus-core: Blokus 系タイル配置ゲーム向け MCTS 探索エンジン
//!
//! 多人数・完全情報のタイル配置ゲーム（Blokus ファミリー）のための
//! モンテカルロ木探索エンジンコア。
//!
//! - `tree`: ロックフリーに並行更新される固定容量の探索木
//! - `search`: 4 フェーズのシミュレーションループ、サブツリー再利用、
//!   メモリ圧迫時の枝刈り、時間・回数ベースの anytime 打ち切り
//! - `movegen`: バリアントごとの指し手テーブルと (点, ピース, 隣接禁止
//!   ステータス) で引く前計算済み候補リスト
//! - `stats`: 逐次統計（ロックフリーの dirty 版を含む）
//! - `board` / `state`: コアを駆動する Blokus 盤面コラボレータ
//!
//! 探索コアはゲーム固有の盤面を `search::GameState` 契約越しにのみ
//! 触る。別のタイル配置ゲームを載せる場合はこのトレイトを実装する。
//!
//! # 使用例
//!
//! ```no_run
//! use rblokus_core::search::{Search, SearchConfig, SearchLimits};
//! use rblokus_core::state::BlokusState;
//! use rblokus_core::variant::Variant;
//!
//! let mut search: Search<BlokusState> = Search::new(SearchConfig::default()).unwrap();
//! let state = BlokusState::from_variant(Variant::Duo, 0);
//! let mv = search.search(&state, SearchLimits::count(10_000.0), true);
//! ```

pub mod board;
pub mod movegen;
pub mod search;
pub mod state;
pub mod stats;
pub mod tree;
pub mod types;
pub mod variant;
