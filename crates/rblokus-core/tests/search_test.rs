//! 合成ゲームでの探索エンドツーエンドテスト

use std::time::Instant;

use rblokus_core::search::{
    Eval, GameState, LastGoodReply, Search, SearchConfig, SearchLimits,
};
use rblokus_core::tree::NodeExpander;
use rblokus_core::types::{Color, Float, Move, PlayerMove};

/// 1 手で終わる 1 人ゲーム。3 つの合法手の終端値は既知
#[derive(Clone)]
struct ThreeMoveGame {
    played: Option<Move>,
}

impl ThreeMoveGame {
    const VALUES: [(u16, Float); 3] = [(1, 0.2), (2, 0.8), (3, 0.5)];

    fn new() -> ThreeMoveGame {
        ThreeMoveGame { played: None }
    }
}

impl GameState for ThreeMoveGame {
    fn nu_players(&self) -> usize {
        1
    }

    fn player_to_move(&self) -> Color {
        Color::new(0)
    }

    fn move_range(&self) -> usize {
        4
    }

    fn start_simulation(&mut self, _n: usize) {
        self.played = None;
    }

    fn gen_children(&mut self, expander: &mut NodeExpander<'_>, init_val: Float) {
        if self.played.is_none() {
            for (mv, _) in Self::VALUES {
                expander.add_child(Move::new(mv), init_val, 0.0);
            }
        }
    }

    fn play_in_tree(&mut self, mv: Move) {
        self.played = Some(mv);
    }

    fn play_expanded_child(&mut self, mv: Move) {
        self.played = Some(mv);
    }

    fn gen_playout_move(
        &mut self,
        _lgr: Option<&LastGoodReply>,
        _last: Move,
        _second_last: Move,
    ) -> Option<PlayerMove> {
        None
    }

    fn play_playout(&mut self, _mv: Move) {}

    fn evaluate(&self, eval: &mut Eval) {
        eval[0] = match self.played {
            Some(mv) => {
                Self::VALUES
                    .iter()
                    .find(|&&(m, _)| Move::new(m) == mv)
                    .unwrap()
                    .1
            }
            None => 0.5,
        };
    }
}

/// 合法手のない局面
#[derive(Clone)]
struct NoMoveGame;

impl GameState for NoMoveGame {
    fn nu_players(&self) -> usize {
        1
    }

    fn player_to_move(&self) -> Color {
        Color::new(0)
    }

    fn move_range(&self) -> usize {
        1
    }

    fn start_simulation(&mut self, _n: usize) {}

    fn gen_children(&mut self, _expander: &mut NodeExpander<'_>, _init_val: Float) {}

    fn play_in_tree(&mut self, _mv: Move) {}

    fn play_expanded_child(&mut self, _mv: Move) {}

    fn gen_playout_move(
        &mut self,
        _lgr: Option<&LastGoodReply>,
        _last: Move,
        _second_last: Move,
    ) -> Option<PlayerMove> {
        None
    }

    fn play_playout(&mut self, _mv: Move) {}

    fn evaluate(&self, eval: &mut Eval) {
        eval[0] = 0.5;
    }
}

fn single_thread_config() -> SearchConfig {
    SearchConfig {
        nu_threads: 1,
        tree_memory: 1 << 20,
        reuse_subtree: false,
        ..Default::default()
    }
}

/// 既知の終端値 {0.2, 0.8, 0.5} から 0.8 の手を選ぶ
#[test]
fn test_selects_best_known_move() {
    let mut search: Search<ThreeMoveGame> = Search::new(single_thread_config()).unwrap();
    let state = ThreeMoveGame::new();
    let mv = search
        .search(&state, SearchLimits::count(1000.0), true)
        .expect("search must find a move");
    assert_eq!(mv, Move::new(2));
    assert!(search.nu_simulations() > 0);
}

/// 合法手がなければ「手なし」を返す（例外やクラッシュではなく）
#[test]
fn test_no_legal_moves_returns_none() {
    let mut search: Search<NoMoveGame> = Search::new(single_thread_config()).unwrap();
    assert_eq!(search.search(&NoMoveGame, SearchLimits::count(100.0), true), None);
}

/// max_count = 0 かつ max_time = 0.2s の探索はおよそ 0.2 秒で返る
#[test]
fn test_time_limited_search_terminates() {
    let mut search: Search<ThreeMoveGame> = Search::new(single_thread_config()).unwrap();
    let state = ThreeMoveGame::new();
    let start = Instant::now();
    let mv = search.search(&state, SearchLimits::time(0.2), true);
    let elapsed = start.elapsed().as_secs_f64();
    assert!(mv.is_some());
    // スケジューリングノイズ込みの上限
    assert!(elapsed < 2.0, "search took {elapsed}s");
}

/// 早期終了してもシミュレーション数の下限は守られる
#[test]
fn test_min_simulations_enforced() {
    let mut search: Search<ThreeMoveGame> = Search::new(single_thread_config()).unwrap();
    let state = ThreeMoveGame::new();
    let limits = SearchLimits {
        max_count: 0.0,
        min_simulations: 200.0,
        max_time: 0.0,
    };
    let mv = search.search(&state, limits, true);
    assert!(mv.is_some());
    assert!(search.nu_simulations() >= 200);
}

/// 決定的モードのシングルスレッド探索は再現可能
#[test]
fn test_deterministic_single_thread_reproducible() {
    let run = || {
        let cfg = SearchConfig {
            deterministic: true,
            ..single_thread_config()
        };
        let mut search: Search<ThreeMoveGame> = Search::new(cfg).unwrap();
        let mv = search
            .search(&ThreeMoveGame::new(), SearchLimits::count(500.0), true)
            .unwrap();
        let tree = search.tree();
        let visits: Vec<f32> = tree
            .children(rblokus_core::tree::ROOT)
            .map(|i| tree.node(i).visit_count())
            .collect();
        (mv, visits)
    };
    let (mv1, visits1) = run();
    let (mv2, visits2) = run();
    assert_eq!(mv1, mv2);
    assert_eq!(visits1, visits2);
}

/// 中断フラグで即座に打ち切られ、それまでの最善手を返す
#[test]
fn test_abort_flag_stops_search() {
    let mut search: Search<ThreeMoveGame> = Search::new(single_thread_config()).unwrap();
    let abort = search.abort_handle();
    search.set_callback(Box::new(move |_, _| {
        abort.store(true, std::sync::atomic::Ordering::SeqCst);
    }));
    let state = ThreeMoveGame::new();
    let start = Instant::now();
    let mv = search.search(&state, SearchLimits::time(30.0), true);
    assert!(mv.is_some());
    assert!(start.elapsed().as_secs_f64() < 10.0);
}

/// RAVE 有効でも正しい手に収束し、RAVE 統計が観測できる
#[test]
fn test_rave_enabled_search() {
    let cfg = SearchConfig {
        rave: true,
        ..single_thread_config()
    };
    let mut search: Search<ThreeMoveGame> = Search::new(cfg).unwrap();
    let mv = search
        .search(&ThreeMoveGame::new(), SearchLimits::count(1000.0), true)
        .unwrap();
    assert_eq!(mv, Move::new(2));
}
