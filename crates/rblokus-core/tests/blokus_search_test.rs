//! Blokus 盤面での探索エンドツーエンドテスト

use rblokus_core::search::{Search, SearchConfig, SearchLimits};
use rblokus_core::state::BlokusState;
use rblokus_core::tree::ROOT;
use rblokus_core::types::Color;
use rblokus_core::variant::Variant;

fn duo_config() -> SearchConfig {
    SearchConfig {
        nu_threads: 1,
        tree_memory: 8 << 20,
        deterministic: true,
        ..Default::default()
    }
}

/// 初期局面から合法手が返り、ツリーに統計が付く
#[test]
fn test_duo_opening_search() {
    let mut search: Search<BlokusState> = Search::new(duo_config()).unwrap();
    let state = BlokusState::from_variant(Variant::Duo, 11);
    let mv = search
        .search(&state, SearchLimits::count(300.0), true)
        .expect("opening position must have a move");
    // 選ばれた手はルートの子に居て、訪問されている
    let tree = search.tree();
    let found = tree
        .children(ROOT)
        .find(|&i| tree.node(i).get_move() == mv)
        .expect("selected move must be a root child");
    assert!(tree.node(found).visit_count() > 0.0);
    // 序盤は 5 マスピースだけが候補になる
    let bc = state.board().board_const();
    assert_eq!(bc.move_info(mv).points().len(), 5);
}

/// サブツリー再利用: 2 回目の探索は前回のツリーを持ち越して始まる
#[test]
fn test_tree_reuse_between_searches() {
    let cfg = SearchConfig {
        reuse_subtree: true,
        ..duo_config()
    };
    let mut search: Search<BlokusState> = Search::new(cfg).unwrap();
    let state = BlokusState::from_variant(Variant::Duo, 5);
    let max_count = 400.0;
    let mv = search
        .search(&state, SearchLimits::count(max_count), true)
        .unwrap();

    // 選ばれた手を盤に指して後続局面を作る
    let mut board = state.root_board().clone();
    let c = board.to_play();
    board.play(c, mv);
    let state2 = BlokusState::new(board, 5);
    search
        .search(&state2, SearchLimits::count(max_count), true)
        .unwrap();
    // 持ち越したサブツリーの visit がルートに乗るため、ルートの
    // visit 数はこの探索のシミュレーション数より大きい
    assert!(
        search.root_visit_count() as usize > search.nu_simulations(),
        "no visits were carried over"
    );
}

/// 再利用を切ると毎回ゼロから始まる
#[test]
fn test_reuse_disabled_starts_fresh() {
    let cfg = SearchConfig {
        reuse_subtree: false,
        ..duo_config()
    };
    let mut search: Search<BlokusState> = Search::new(cfg).unwrap();
    let state = BlokusState::from_variant(Variant::Duo, 5);
    let mv = search.search(&state, SearchLimits::count(200.0), true).unwrap();
    let mut board = state.root_board().clone();
    let c = board.to_play();
    board.play(c, mv);
    let state2 = BlokusState::new(board, 5);
    search.search(&state2, SearchLimits::count(200.0), true).unwrap();
    // 持ち越しがないのでルートの visit 数とシミュレーション数が一致する
    let diff = search.root_visit_count() as f64 - search.nu_simulations() as f64;
    assert!(diff.abs() <= 1.0);
}

/// ツリーメモリが小さくても枝刈りループが停止し、手が返る
#[test]
fn test_small_tree_prunes_and_terminates() {
    let cfg = SearchConfig {
        // 数百ノードしか入らない容量
        tree_memory: 64 * 1024,
        ..duo_config()
    };
    let mut search: Search<BlokusState> = Search::new(cfg).unwrap();
    let state = BlokusState::from_variant(Variant::Duo, 3);
    let mv = search.search(&state, SearchLimits::count(2000.0), true);
    assert!(mv.is_some());
}

/// マルチスレッド探索もクラッシュせず手を返す（結果は非決定的）
#[test]
fn test_multithreaded_search() {
    let cfg = SearchConfig {
        nu_threads: 4,
        tree_memory: 16 << 20,
        virtual_loss: true,
        deterministic: false,
        ..Default::default()
    };
    let mut search: Search<BlokusState> = Search::new(cfg).unwrap();
    let state = BlokusState::from_variant(Variant::Duo, 9);
    // 0.5 秒以上かかる探索でないとシングルスレッドに落ちる
    let mv = search.search(&state, SearchLimits::time(1.0), true);
    assert!(mv.is_some());
    assert!(search.nu_simulations() > 0);
}

/// LGR 有効の探索（設定検証込み）
#[test]
fn test_lgr_search() {
    let cfg = SearchConfig {
        use_lgr: true,
        lgr_hash_table_size: 1 << 14,
        ..duo_config()
    };
    let mut search: Search<BlokusState> = Search::new(cfg).unwrap();
    let state = BlokusState::from_variant(Variant::Duo, 2);
    assert!(search.search(&state, SearchLimits::count(200.0), true).is_some());
}

/// 双方のルート評価が探索後に妥当な範囲へ入る
#[test]
fn test_root_val_in_range() {
    let mut search: Search<BlokusState> = Search::new(duo_config()).unwrap();
    let state = BlokusState::from_variant(Variant::Duo, 1);
    search.search(&state, SearchLimits::count(200.0), true).unwrap();
    for c in [Color::new(0), Color::new(1)] {
        let (mean, count) = search.root_val(c);
        assert!(count > 0.0);
        assert!((0.0..=1.0).contains(&mean));
    }
}
