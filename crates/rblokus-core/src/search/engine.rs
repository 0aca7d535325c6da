//! 探索エンジン（オーケストレータ）
//!
//! 4 フェーズの MCTS ループ: 選択（UCT バイアス + 枝刈りショートカット）、
//! 展開（閾値超えのリーフを前計算テーブル経由で実体化）、playout、
//! 逆伝播（値 + ルート評価 + RAVE + LGR）。
//!
//! 1 回の探索は Preparing（後続局面判定とサブツリー再利用）→ Running
//! （ワーカー並列シミュレーション）→ Terminating（予算・中断・早期
//! 終了判定）→ Finalizing（最終手選択）と進む。ツリーが溢れたら全
//! スレッドを止めて閾値付きコピーで枝刈りし、再開する。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::stats::{StatisticsDirtyLockFree, StatisticsExt};
use crate::tree::{Expansion, NodeExpander, NodeIdx, Tree, ROOT};
use crate::types::{Color, Float, Move, PlayerMove};

use super::bias::BiasTerm;
use super::config::{SearchConfig, SearchError};
use super::interval::{IntervalChecker, TimeIntervalChecker};
use super::lgr::LastGoodReply;
use super::limits::SearchLimits;
use super::state::{Eval, GameState, Simulation, MAX_PLAYERS};
use super::thread::Worker;

/// f32 の仮数部（24bit）で正確に数えられるカウントの上限（2^24 - 1）
const MAX_FLOAT_COUNT: Float = 16_777_215.0;

/// 進捗コールバック（経過秒, 推定残り秒）
pub type ProgressCallback = dyn Fn(f64, f64) + Send + Sync;

// =============================================================================
// 共有状態
// =============================================================================

/// ロックフリー探索中に全スレッドが並行更新する状態
struct SearchGlobals {
    /// プレイヤーごとのルート局面評価
    ///
    /// 同一ゲーム内の探索をまたいで持ち越し、勝率推定の初期値になる。
    root_val: [StatisticsDirtyLockFree; MAX_PLAYERS],
    /// この探索の全スレッド合計シミュレーション数
    nu_simulations: AtomicUsize,
    /// いずれかのスレッドがツリー溢れで停止した
    out_of_mem: AtomicBool,
}

impl SearchGlobals {
    fn new(tie_value: Float) -> SearchGlobals {
        SearchGlobals {
            root_val: std::array::from_fn(|_| StatisticsDirtyLockFree::new(tie_value)),
            nu_simulations: AtomicUsize::new(0),
            out_of_mem: AtomicBool::new(false),
        }
    }
}

/// 1 回の探索の共有コンテキスト（ワーカーへ Arc で配る）
struct SearchContext {
    cfg: SearchConfig,
    /// 有効な最大時間（サブツリー抽出に使った分を差し引き済み）
    max_time: f64,
    max_count: Float,
    min_simulations: Float,
    tree: Arc<Tree>,
    globals: Arc<SearchGlobals>,
    abort: Arc<AtomicBool>,
    lgr: Option<Arc<LastGoodReply>>,
    callback: Option<Arc<ProgressCallback>>,
    timer: Instant,
    multithread: bool,
    nu_players: usize,
    /// ルート局面の手番
    player: Color,
}

// =============================================================================
// スレッドローカル状態
// =============================================================================

/// スレッドごとの探索状態
struct ThreadState<S: GameState> {
    thread_id: usize,
    state: S,
    simulation: Simulation,
    bias: BiasTerm,
    full_select_counter: u32,
    is_out_of_mem: bool,
    nu_simulations: usize,
    /// シミュレーション全長の統計
    stat_len: StatisticsExt,
    /// in-tree 長の統計
    stat_in_tree_len: StatisticsExt,
    /// 完全選択をスキップした長さの統計
    stat_fs_len: StatisticsExt,
    /// update_rave 用: (player, move) が出現したか
    was_played: Vec<bool>,
    /// update_rave 用: 最初の出現位置（was_played のときのみ有効）
    first_play: Vec<u32>,
    move_range: usize,
}

impl<S: GameState> ThreadState<S> {
    fn new(thread_id: usize, state: S, cfg: &SearchConfig) -> ThreadState<S> {
        let move_range = state.move_range();
        let nu_players = state.nu_players();
        ThreadState {
            thread_id,
            state,
            simulation: Simulation::new(),
            bias: BiasTerm::new(cfg.bias_term_constant),
            full_select_counter: 0,
            is_out_of_mem: false,
            nu_simulations: 0,
            stat_len: StatisticsExt::new(),
            stat_in_tree_len: StatisticsExt::new(),
            stat_fs_len: StatisticsExt::new(),
            was_played: vec![false; move_range * nu_players],
            first_play: vec![0; move_range * nu_players],
            move_range,
        }
    }

    #[inline]
    fn played_index(&self, c: Color, mv: Move) -> usize {
        c.index() * self.move_range + mv.index()
    }
}

// =============================================================================
// Search
// =============================================================================

/// 探索結果の統計（`get_info` 用のスナップショット）
#[derive(Debug, Clone, Copy, Default)]
struct LastSearchInfo {
    time: f64,
    nu_simulations: usize,
    stat_len: Option<StatisticsExt>,
    stat_in_tree_len: Option<StatisticsExt>,
    stat_fs_len: Option<StatisticsExt>,
}

/// MCTS 探索エンジン
///
/// ゲーム固有の状態 `S` はスレッドごとにクローンして使う。ツリーは
/// 全スレッド共有でロックフリーに更新され、再利用・枝刈り用の一時
/// ツリーはコーディネータが排他所有し、完成したら Arc ごと交換する。
pub struct Search<S: GameState> {
    cfg: SearchConfig,
    tree: Arc<Tree>,
    tmp_tree: Arc<Tree>,
    globals: Arc<SearchGlobals>,
    abort: Arc<AtomicBool>,
    lgr: Option<Arc<LastGoodReply>>,
    callback: Option<Arc<ProgressCallback>>,
    /// ヘルパースレッド（thread 1..nu_threads。thread 0 は呼び出し元）
    workers: Vec<Worker>,
    /// 前回探索のルート状態（後続局面判定用）
    last_state: Option<S>,
    player: Color,
    nu_players: usize,
    info: LastSearchInfo,
}

impl<S: GameState> Search<S> {
    pub fn new(cfg: SearchConfig) -> Result<Search<S>, SearchError> {
        cfg.validate()?;
        let max_nodes = cfg.max_nodes();
        log::debug!("Search tree size: 2 x {max_nodes} nodes");
        let tree = Arc::new(Tree::new(max_nodes, cfg.nu_threads));
        let tmp_tree = Arc::new(Tree::new(max_nodes, cfg.nu_threads));
        let lgr = if cfg.use_lgr {
            Some(Arc::new(LastGoodReply::new(cfg.lgr_hash_table_size)))
        } else {
            None
        };
        let workers = (1..cfg.nu_threads).map(Worker::new).collect();
        let globals = Arc::new(SearchGlobals::new(cfg.tie_value));
        Ok(Search {
            cfg,
            tree,
            tmp_tree,
            globals,
            abort: Arc::new(AtomicBool::new(false)),
            lgr,
            callback: None,
            workers,
            last_state: None,
            player: Color::new(0),
            nu_players: 1,
            info: LastSearchInfo::default(),
        })
    }

    #[inline]
    pub fn config(&self) -> &SearchConfig {
        &self.cfg
    }

    /// 探索ツリーへの読み取り専用ビュー（UI の候補手統計表示用）
    #[inline]
    pub fn tree(&self) -> &Arc<Tree> {
        &self.tree
    }

    /// 外部からの中断用ハンドル
    ///
    /// true を入れると全ワーカーがシミュレーション境界で停止する。
    /// 新しい探索の開始時にリセットされる。
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// プレイヤーのルート局面評価
    pub fn root_val(&self, player: Color) -> (Float, Float) {
        let s = &self.globals.root_val[player.index()];
        (s.mean(), s.count())
    }

    /// ゲーム開始時のルート評価リセット
    pub fn reset_root_val(&mut self) {
        for s in &self.globals.root_val {
            s.clear(self.cfg.tie_value);
        }
    }

    /// ルートの visit カウント（シミュレーション数 + 再利用分）
    pub fn root_visit_count(&self) -> Float {
        self.tree.root().visit_count()
    }

    /// この探索の全スレッド合計シミュレーション数
    pub fn nu_simulations(&self) -> usize {
        self.globals.nu_simulations.load(Ordering::Relaxed)
    }

    pub fn set_callback(&mut self, callback: Box<ProgressCallback>) {
        self.callback = Some(Arc::from(callback));
    }

    pub fn set_bias_term_constant(&mut self, c: Float) {
        self.cfg.bias_term_constant = c;
    }

    pub fn set_expand_threshold(&mut self, n: Float) {
        self.cfg.expand_threshold = n;
    }

    pub fn set_reuse_subtree(&mut self, enable: bool) {
        self.cfg.reuse_subtree = enable;
    }

    pub fn set_deterministic(&mut self) {
        self.cfg.deterministic = true;
    }

    /// ツリーメモリの変更（両ツリーを作り直す）
    pub fn set_tree_memory(&mut self, memory: usize) -> Result<(), SearchError> {
        self.cfg.tree_memory = memory;
        self.cfg.validate()?;
        let max_nodes = self.cfg.max_nodes();
        log::debug!("Search tree size: 2 x {max_nodes} nodes");
        self.tree = Arc::new(Tree::new(max_nodes, self.cfg.nu_threads));
        self.tmp_tree = Arc::new(Tree::new(max_nodes, self.cfg.nu_threads));
        self.last_state = None;
        Ok(())
    }

    /// 探索を実行する
    ///
    /// 戻り値 None は合法手がない（終端局面）。中断・時間切れの場合は
    /// その時点の最善手を返す。`always_search` が false で、サブツリー
    /// 抽出が時間切れ・中断で不完全に終わった場合は探索せず None を
    /// 返す（完全なツリーを必要とする pondering 用）。
    pub fn search(&mut self, root: &S, limits: SearchLimits, always_search: bool) -> Option<Move> {
        let mut max_time = if limits.has_count_limit() {
            // シミュレーション数制限時も max_time は安全弁として残る
            f64::MAX
        } else {
            limits.max_time
        };
        self.player = root.player_to_move();
        self.nu_players = root.nu_players();
        self.abort.store(false, Ordering::SeqCst);

        // Preparing: 後続局面判定とルート評価の持ち越し
        let followup_sequence = self
            .last_state
            .as_ref()
            .and_then(|prev| root.followup_sequence(prev));
        self.last_state = Some(root.clone());
        let mut is_followup = followup_sequence.is_some();
        let mut is_same = false;
        if let Some(seq) = &followup_sequence {
            if seq.is_empty() {
                is_same = true;
                is_followup = false;
            }
        }
        if is_same
            || (is_followup && followup_sequence.as_ref().unwrap().len() <= self.nu_players)
        {
            // 前回のルート評価をカウント上限 100 で引き継ぐ
            for i in 0..self.nu_players {
                let root_val = &self.globals.root_val[i];
                if root_val.count() > 100.0 {
                    root_val.init(root_val.mean(), 100.0);
                }
            }
        } else {
            for i in 0..self.nu_players {
                self.globals.root_val[i].init(self.cfg.tie_value, 1.0);
            }
        }

        let mut clear_tree = true;
        if (self.cfg.reuse_subtree && is_followup) || (self.cfg.reuse_tree && is_same) {
            let tree_nodes = self.tree.nu_nodes();
            let seq = followup_sequence.as_ref().unwrap();
            if seq.is_empty() {
                if tree_nodes > 1 {
                    log::debug!(
                        "Reusing all {tree_nodes} nodes (count={})",
                        self.tree.root().visit_count()
                    );
                    clear_tree = false;
                }
            } else {
                let extract_timer = Instant::now();
                self.tmp_tree.clear(self.cfg.tie_value);
                if let Some(node) = self.tree.find_node(seq) {
                    let mut checker = TimeIntervalChecker::new(max_time, &self.abort);
                    if self.cfg.deterministic {
                        checker.set_deterministic(1_000_000);
                    }
                    let aborted =
                        !self.tree.extract_subtree(&self.tmp_tree, node, &mut || {
                            checker.check()
                        });
                    if let Some((value, count)) =
                        estimate_reused_root_val(&self.tmp_tree)
                    {
                        self.globals.root_val[self.player.index()].add_weighted(value, count);
                    }
                    if aborted && !always_search {
                        return None;
                    }
                    let tmp_tree_nodes = self.tmp_tree.nu_nodes();
                    if tree_nodes > 1 && tmp_tree_nodes > 1 {
                        let time = extract_timer.elapsed().as_secs_f64();
                        let percent = 100.0 * tmp_tree_nodes as f64 / tree_nodes as f64;
                        log::debug!(
                            "Reusing {tmp_tree_nodes} nodes ({percent:.1}% tm={time:.4})"
                        );
                        std::mem::swap(&mut self.tree, &mut self.tmp_tree);
                        clear_tree = false;
                        max_time = (max_time - time).max(0.0);
                    }
                }
            }
        }
        if clear_tree {
            self.tree.clear(self.cfg.tie_value);
        }

        if !is_followup {
            if let Some(lgr) = &self.lgr {
                lgr.clear();
            }
        }
        self.globals.nu_simulations.store(0, Ordering::SeqCst);
        self.globals.out_of_mem.store(false, Ordering::SeqCst);
        let mut prune_min_count = self.cfg.prune_count_start;

        // 0.5 秒未満で終わる探索はシングルスレッドで走らせる。開始直後は
        // 更新ロスが多い（全スレッドがルートを展開し最後のスレッドの子
        // だけが残る、など）ため
        let reused_count = self.tree.root().visit_count();
        let expected_time = if limits.has_count_limit() {
            ((limits.max_count - reused_count).max(0.0) as f64) / self.cfg.expected_sim_per_sec
        } else {
            max_time
        };
        let mut nu_threads = self.cfg.nu_threads;
        if nu_threads > 1 && expected_time < 0.5 {
            log::debug!("Using single-threading for very short search");
            nu_threads = 1;
        }

        let mut state0 = root.clone();
        state0.start_search();
        let mut ts0 = ThreadState::new(0, state0, &self.cfg);

        let timer = Instant::now();
        let make_ctx = |search: &Search<S>, max_time: f64, timer: Instant| SearchContext {
            cfg: search.cfg.clone(),
            max_time,
            max_count: limits.max_count,
            min_simulations: limits.min_simulations,
            tree: Arc::clone(&search.tree),
            globals: Arc::clone(&search.globals),
            abort: Arc::clone(&search.abort),
            lgr: search.lgr.as_ref().map(Arc::clone),
            callback: search.callback.as_ref().map(Arc::clone),
            timer,
            multithread: nu_threads > 1,
            nu_players: search.nu_players,
            player: search.player,
        };

        // ルートが未展開なら展開する
        if !self.tree.root().has_children() {
            let ctx = make_ctx(self, max_time, timer);
            ts0.state.start_simulation(0);
            ts0.state.finish_in_tree();
            if let ExpandOutcome::Full = expand_node(&ctx, &mut ts0, ROOT) {
                log::warn!("Tree too small to expand the root node");
            }
        }

        let nu_root_children = self.tree.root().nu_children();
        if nu_root_children == 0 {
            log::debug!("No legal moves at root");
        } else if nu_root_children == 1 && limits.min_simulations == 0.0 {
            log::debug!("Root has only one child");
        } else {
            loop {
                let ctx = Arc::new(make_ctx(self, max_time, timer));
                for i in 1..nu_threads {
                    let ctx = Arc::clone(&ctx);
                    let mut state = root.clone();
                    state.start_search();
                    self.workers[i - 1].start_search(Box::new(move || {
                        let mut ts = ThreadState::new(i, state, &ctx.cfg);
                        search_loop(&ctx, &mut ts);
                    }));
                }
                search_loop(&ctx, &mut ts0);
                for i in 1..nu_threads {
                    self.workers[i - 1].wait_search_finished();
                }
                drop(ctx);
                if !self.globals.out_of_mem.load(Ordering::SeqCst) {
                    break;
                }
                let time = timer.elapsed().as_secs_f64();
                match self.prune(time, max_time - time, prune_min_count) {
                    Some(new_min_count) => prune_min_count = new_min_count,
                    None => {
                        log::debug!("Aborting search because pruning failed.");
                        break;
                    }
                }
                self.globals.out_of_mem.store(false, Ordering::SeqCst);
            }
        }

        if self.tree.root().visit_count() >= MAX_FLOAT_COUNT {
            log::warn!("Maximum count supported by floating type exceeded");
        }

        self.info = LastSearchInfo {
            time: timer.elapsed().as_secs_f64(),
            nu_simulations: self.nu_simulations(),
            stat_len: Some(ts0.stat_len),
            stat_in_tree_len: Some(ts0.stat_in_tree_len),
            stat_fs_len: Some(ts0.stat_fs_len),
        };
        log::debug!("{}", self.get_info());
        self.select_move()
    }

    /// 閾値付きコピーによる枝刈り
    ///
    /// コピーが 50% 超を残したら次回の閾値を倍にする。コピーが中断
    /// されたら None（探索を打ち切る）。
    fn prune(&mut self, time: f64, max_time: f64, prune_min_count: Float) -> Option<Float> {
        let timer = Instant::now();
        let mut checker = TimeIntervalChecker::new(max_time.max(0.0), &self.abort);
        if self.cfg.deterministic {
            checker.set_deterministic(1_000_000);
        }
        self.tmp_tree.clear(self.tree.root().value());
        if !self
            .tree
            .copy_subtree(&self.tmp_tree, ROOT, prune_min_count, &mut || checker.check())
        {
            log::debug!("Pruning aborted");
            return None;
        }
        let percent = self.tmp_tree.nu_nodes() * 100 / self.tree.nu_nodes().max(1);
        log::debug!(
            "Pruning MinCnt: {prune_min_count}, AtTm: {time:.2}, Nds: {} ({percent}%), Tm: {:.4}",
            self.tmp_tree.nu_nodes(),
            timer.elapsed().as_secs_f64()
        );
        std::mem::swap(&mut self.tree, &mut self.tmp_tree);
        if percent > 50 {
            if prune_min_count >= 0.5 * Float::MAX {
                return None;
            }
            Some(prune_min_count * 2.0)
        } else {
            Some(prune_min_count)
        }
    }

    /// 最終手選択: ルートの子のうち勝ち数（value_count × value）が
    /// 最大のもの。同値なら先に列挙された方
    pub fn select_final(&self) -> Option<NodeIdx> {
        let mut best: Option<(NodeIdx, Float)> = None;
        for i in self.tree.children(ROOT) {
            let node = self.tree.node(i);
            let wins = node.value_count() * node.value();
            match best {
                Some((_, max_wins)) if wins <= max_wins => {}
                _ => best = Some((i, wins)),
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn select_move(&self) -> Option<Move> {
        self.select_final().map(|i| self.tree.node(i).get_move())
    }

    /// 診断サマリ
    pub fn get_info(&self) -> String {
        let root = self.tree.root();
        let info = &self.info;
        if info.nu_simulations == 0 {
            return "No simulations".to_string();
        }
        let root_val = &self.globals.root_val[self.player.index()];
        let mut s = format!(
            "Val: {:.2}, ValCnt: {:.0}, VstCnt: {:.0}, Sim: {}",
            root_val.mean(),
            root_val.count(),
            root.visit_count(),
            info.nu_simulations,
        );
        if let Some(child) = self.select_final() {
            if root.visit_count() > 0.0 {
                s += &format!(
                    ", Chld: {:.1}%",
                    100.0 * self.tree.node(child).visit_count() / root.visit_count()
                );
            }
        }
        s += &format!(
            "\nNds: {}, Tm: {:.3}s, Sim/s: {:.0}",
            self.tree.nu_nodes(),
            info.time,
            info.nu_simulations as f64 / info.time.max(1e-9),
        );
        if let (Some(len), Some(in_tree), Some(fs)) =
            (info.stat_len, info.stat_in_tree_len, info.stat_fs_len)
        {
            s += &format!(
                ", Len: {}\nDp: {}, FS: {}",
                len.to_string_fmt(1, true),
                in_tree.to_string_fmt(1, true),
                fs.to_string_fmt(1, true),
            );
        }
        s
    }
}

/// 再利用サブツリーのルート値を子から推定する
///
/// ノードは指し手の値しか持たないため、昇格したルートの値は visit
/// カウント最大の子の値で近似する。
fn estimate_reused_root_val(tree: &Tree) -> Option<(Float, Float)> {
    let mut best: Option<NodeIdx> = None;
    let mut max_count = 0.0;
    for i in tree.children(ROOT) {
        let count = tree.node(i).visit_count();
        if count > max_count {
            max_count = count;
            best = Some(i);
        }
    }
    let best = best?;
    let node = tree.node(best);
    if node.value_count() > 0.0 {
        Some((node.value(), node.value_count()))
    } else {
        None
    }
}

// =============================================================================
// シミュレーションループ（全ワーカー共通）
// =============================================================================

fn search_loop<S: GameState>(ctx: &SearchContext, ts: &mut ThreadState<S>) {
    ts.simulation.nodes.clear();
    ts.simulation.moves.clear();
    ts.full_select_counter = 0;
    ts.bias.set_bias_term_constant(ctx.cfg.bias_term_constant);
    let mut time_interval = 0.1;
    if ctx.max_count == 0.0 && ctx.max_time < 1.0 {
        time_interval = 0.1 * ctx.max_time;
    }
    let mut expensive_abort_checker = IntervalChecker::new(time_interval);
    if ctx.cfg.deterministic {
        let interval = (ctx.cfg.expected_sim_per_sec / 5.0).max(1.0) as u32;
        expensive_abort_checker.set_deterministic(interval);
    }
    loop {
        ts.is_out_of_mem = false;
        let count = ctx.tree.root().visit_count();
        let thread_id = ts.thread_id;
        let stop = check_abort(ctx, count)
            || expensive_abort_checker.check(&mut || check_abort_expensive(ctx, thread_id));
        if stop
            && ctx.globals.nu_simulations.load(Ordering::Relaxed) as Float
                >= ctx.min_simulations
        {
            break;
        }
        let n = ctx.globals.nu_simulations.fetch_add(1, Ordering::Relaxed);
        ts.nu_simulations += 1;
        ts.state.start_simulation(n);
        play_in_tree(ctx, ts);
        if ts.is_out_of_mem {
            ctx.globals.out_of_mem.store(true, Ordering::SeqCst);
            break;
        }
        playout(ctx, ts);
        let mut eval: Eval = [0.0; MAX_PLAYERS];
        ts.state.evaluate(&mut eval);
        ts.simulation.eval = eval;
        ts.stat_len.add(ts.simulation.moves.len() as f64);
        update_values(ctx, ts);
        if ctx.cfg.rave {
            update_rave(ctx, ts);
        }
        if ctx.lgr.is_some() {
            update_lgr(ctx, ts);
        }
    }
}

/// 安価な中断チェック（毎シミュレーション）
fn check_abort(ctx: &SearchContext, root_count: Float) -> bool {
    if ctx.max_count > 0.0 && root_count >= ctx.max_count {
        log::trace!("Maximum count reached");
        return true;
    }
    if ctx.globals.out_of_mem.load(Ordering::Relaxed) {
        // 別スレッドがツリー溢れで止まった: 集団で枝刈りに入る
        return true;
    }
    false
}

/// 高コストな中断チェック（約 0.1 秒ごと）
fn check_abort_expensive(ctx: &SearchContext, thread_id: usize) -> bool {
    if ctx.abort.load(Ordering::Relaxed) {
        log::debug!("[{thread_id}] Search aborted");
        return true;
    }
    let time = ctx.timer.elapsed().as_secs_f64();
    if !ctx.cfg.deterministic && time < 0.1 {
        // 時間が短すぎるとシミュレーション毎秒が不正確
        return false;
    }
    let nu_simulations = ctx.globals.nu_simulations.load(Ordering::Relaxed);
    let simulations_per_sec = if time == 0.0 {
        ctx.cfg.expected_sim_per_sec
    } else {
        nu_simulations as f64 / time
    };
    let remaining_time;
    let remaining_simulations;
    if ctx.max_count == 0.0 {
        // 時間制限で探索している
        if time > ctx.max_time {
            log::debug!("[{thread_id}] Maximum time reached");
            return true;
        }
        remaining_time = ctx.max_time - time;
        remaining_simulations = (remaining_time * simulations_per_sec) as Float;
    } else {
        // シミュレーション数制限で探索している
        let count = ctx.tree.root().visit_count();
        remaining_simulations = ctx.max_count - count;
        remaining_time = remaining_simulations as f64 / simulations_per_sec;
    }
    if thread_id == 0 {
        if let Some(callback) = &ctx.callback {
            callback(time, remaining_time);
        }
    }
    if check_cannot_change(ctx, thread_id, remaining_simulations) {
        return true;
    }
    false
}

/// 残り予算では最善手が変わり得ないかの判定（早期終了）
fn check_cannot_change(ctx: &SearchContext, thread_id: usize, remaining: Float) -> bool {
    // select_final は勝ち数最大の子を選ぶ
    let mut max_wins: Float = 0.0;
    let mut second_max: Float = 0.0;
    for i in ctx.tree.children(ROOT) {
        let node = ctx.tree.node(i);
        let wins = node.value() * node.value_count();
        if wins > max_wins {
            second_max = max_wins;
            max_wins = wins;
        } else if wins > second_max {
            second_max = wins;
        }
    }
    let diff = max_wins - second_max;
    if ctx.cfg.use_unlikely_change {
        // 残りシミュレーション数を現在の勝率（ただし 10% 以上）で
        // 重み付けして保守的に見積もる
        let root_val = &ctx.globals.root_val[ctx.player.index()];
        let win_rate = if root_val.count() > 100.0 {
            root_val.mean().max(0.1)
        } else {
            // 統計が足りない
            1.0
        };
        if diff < win_rate * remaining {
            return false;
        }
    } else if diff < remaining {
        return false;
    }
    log::debug!("[{thread_id}] Move will not change");
    true
}

// =============================================================================
// フェーズ 1+2: in-tree
// =============================================================================

enum ExpandOutcome {
    /// 展開成功または競合敗北（続行する最良の子。終端なら None）
    Child(Option<NodeIdx>),
    /// スレッド区画が尽きた
    Full,
}

fn expand_node<S: GameState>(
    ctx: &SearchContext,
    ts: &mut ThreadState<S>,
    node: NodeIdx,
) -> ExpandOutcome {
    let mut expander = NodeExpander::new(&ctx.tree, ts.thread_id, ctx.cfg.child_min_count);
    let init_val = ctx.globals.root_val[ts.state.player_to_move().index()].mean();
    ts.state.gen_children(&mut expander, init_val);
    match expander.link_children(node) {
        Expansion::TreeFull => ExpandOutcome::Full,
        Expansion::Linked(best) => ExpandOutcome::Child(best),
        Expansion::Lost(best) => ExpandOutcome::Child(best),
    }
}

fn play_in_tree<S: GameState>(ctx: &SearchContext, ts: &mut ThreadState<S>) {
    let tree = &ctx.tree;
    let virtual_loss = ctx.multithread && ctx.cfg.virtual_loss;
    let mut node = ROOT;
    tree.inc_visit_count(ROOT);
    let mut expand_threshold = ctx.cfg.expand_threshold;
    if ts.full_select_counter > 0 {
        // 完全な子選択はせず、ノードカウントが full_select_min を
        // 下回るまで前回と同じ経路をたどる
        ts.full_select_counter -= 1;
        let mut depth = 0;
        while tree.node(node).has_children() {
            if tree.node(node).visit_count() <= ctx.cfg.full_select_min
                || depth + 1 >= ts.simulation.nodes.len()
            {
                break;
            }
            node = ts.simulation.nodes[depth + 1];
            tree.inc_visit_count(node);
            if virtual_loss {
                tree.add_value(node, 0.0);
            }
            ts.state.play_in_tree(tree.node(node).get_move());
            depth += 1;
            expand_threshold += ctx.cfg.expand_threshold_inc;
        }
        ts.simulation.nodes.truncate(depth + 1);
        ts.simulation.moves.truncate(depth);
    } else {
        ts.simulation.nodes.clear();
        ts.simulation.nodes.push(ROOT);
        ts.simulation.moves.clear();
        ts.full_select_counter = ctx.cfg.full_select_interval;
    }
    ts.stat_fs_len.add(ts.simulation.moves.len() as f64);
    while tree.node(node).has_children() {
        let child = select_child(tree, &mut ts.bias, ctx.cfg.child_min_count, node);
        tree.inc_visit_count(child);
        if virtual_loss {
            tree.add_value(child, 0.0);
        }
        let mv = tree.node(child).get_move();
        ts.simulation.nodes.push(child);
        ts.simulation
            .moves
            .push(PlayerMove::new(ts.state.player_to_move(), mv));
        ts.state.play_in_tree(mv);
        node = child;
        expand_threshold += ctx.cfg.expand_threshold_inc;
    }
    ts.state.finish_in_tree();
    if tree.node(node).visit_count() > expand_threshold {
        match expand_node(ctx, ts, node) {
            ExpandOutcome::Full => ts.is_out_of_mem = true,
            ExpandOutcome::Child(Some(child)) => {
                let mv = tree.node(child).get_move();
                ts.simulation.nodes.push(child);
                ts.simulation
                    .moves
                    .push(PlayerMove::new(ts.state.player_to_move(), mv));
                ts.state.play_expanded_child(mv);
            }
            ExpandOutcome::Child(None) => {}
        }
    }
    ts.stat_in_tree_len.add(ts.simulation.moves.len() as f64);
}

/// 選択規則: `value + bias(value_count)` 最大の子
///
/// バイアス項の上限から、どうやっても最善を超えられない子は value の
/// 比較だけで読み飛ばす。同値は先に列挙された子が勝つ（決定的）。
fn select_child(tree: &Tree, bias: &mut BiasTerm, min_count: Float, node: NodeIdx) -> NodeIdx {
    let children = tree.children(node);
    debug_assert!(!children.is_empty());
    bias.start_iteration(tree.node(node).visit_count());
    let bias_upper_limit = bias.get(min_count);
    let mut iter = children;
    let first = iter.next().unwrap();
    let first_node = tree.node(first);
    let mut best_value = first_node.value() + bias.get(first_node.value_count());
    let mut best_child = first;
    let mut limit = best_value - bias_upper_limit;
    for i in iter {
        let child = tree.node(i);
        let mut value = child.value();
        if value < limit {
            continue;
        }
        value += bias.get(child.value_count());
        if value > best_value {
            best_value = value;
            best_child = i;
            limit = best_value - bias_upper_limit;
        }
    }
    best_child
}

// =============================================================================
// フェーズ 3: playout
// =============================================================================

fn playout<S: GameState>(ctx: &SearchContext, ts: &mut ThreadState<S>) {
    ts.state.start_playout();
    let nu_moves = ts.simulation.moves.len();
    let mut last = if nu_moves > 0 {
        ts.simulation.moves[nu_moves - 1].mv
    } else {
        Move::NULL
    };
    let mut second_last = if nu_moves > 1 {
        ts.simulation.moves[nu_moves - 2].mv
    } else {
        Move::NULL
    };
    loop {
        let lgr = ctx.lgr.as_deref();
        let Some(pm) = ts.state.gen_playout_move(lgr, last, second_last) else {
            break;
        };
        ts.simulation.moves.push(pm);
        ts.state.play_playout(pm.mv);
        second_last = last;
        last = pm.mv;
    }
}

// =============================================================================
// フェーズ 4: 逆伝播
// =============================================================================

fn update_values<S: GameState>(ctx: &SearchContext, ts: &mut ThreadState<S>) {
    let tree = &ctx.tree;
    let sim = &ts.simulation;
    let eval = &sim.eval;
    let virtual_loss = ctx.multithread && ctx.cfg.virtual_loss;
    for i in 1..sim.nodes.len() {
        let node = sim.nodes[i];
        let pm = sim.moves[i - 1];
        if virtual_loss {
            // 降下時に加えた仮想敗北を実際の結果で置き換える。仮想敗北の
            // 追加は play_in_tree、除去はここで行うため、ロスの確率が
            // 追加と除去で揃わず系統誤差になり得る（許容済みの近似）
            tree.add_value_remove_loss(node, eval[pm.color.index()]);
        } else {
            tree.add_value(node, eval[pm.color.index()]);
        }
    }
    for i in 0..ctx.nu_players {
        ctx.globals.root_val[i].add(eval[i]);
    }
}

/// RAVE 更新
///
/// シミュレーション経路上の各ノードの子について、同じプレイヤーが後で
/// 同じ指し手を指していたら（初出のみ）重み付き擬似観測を加える。
fn update_rave<S: GameState>(ctx: &SearchContext, ts: &mut ThreadState<S>) {
    let nu_moves = ts.simulation.moves.len();
    if nu_moves == 0 {
        return;
    }
    let tree = &ctx.tree;
    let nu_nodes = ts.simulation.nodes.len();
    let mut i = nu_moves - 1;
    // ルートに合法手がない場合はシミュレーションを走らせないため
    // ノードは常に 2 つ以上ある
    debug_assert!(nu_nodes > 1);

    // playout の指し手で was_played / first_play を埋める
    while i >= nu_nodes - 1 {
        let pm = ts.simulation.moves[i];
        if !ts.state.skip_rave(pm.mv) {
            let idx = ts.played_index(pm.color, pm.mv);
            ts.was_played[idx] = true;
            ts.first_play[idx] = i as u32;
        }
        if i == 0 {
            break;
        }
        i -= 1;
    }

    // in-tree の各ノードの子へ RAVE 値を加える
    loop {
        let node = ts.simulation.nodes[i];
        if tree.node(node).visit_count() > ctx.cfg.rave_parent_max {
            break;
        }
        let pm = ts.simulation.moves[i];
        let player = pm.color;
        let eval = ts.simulation.eval[player.index()];
        let dist_weight_factor = if ctx.cfg.rave_dist_weighting {
            (1.0 - ctx.cfg.rave_dist_final) / (nu_moves - i) as Float
        } else {
            0.0
        };
        let children = tree.children(node);
        debug_assert!(!children.is_empty());
        for child_idx in children {
            let child = tree.node(child_idx);
            let mv = child.get_move();
            let idx = ts.played_index(player, mv);
            if !ts.was_played[idx] || child.value_count() > ctx.cfg.rave_child_max {
                continue;
            }
            let first = ts.first_play[idx];
            debug_assert!(first as usize > i);
            if ctx.cfg.rave_check_same {
                let mut other_played_same = false;
                for j in 0..ctx.nu_players {
                    let other = Color::new(j as u8);
                    if other == player {
                        continue;
                    }
                    let other_idx = ts.played_index(other, mv);
                    if ts.was_played[other_idx] {
                        let first_other = ts.first_play[other_idx];
                        if first_other as usize >= i && first_other <= first {
                            other_played_same = true;
                            break;
                        }
                    }
                }
                if other_played_same {
                    continue;
                }
            }
            let mut weight = ctx.cfg.rave_weight;
            if ctx.cfg.rave_dist_weighting {
                weight *= 1.0 - (first as Float - i as Float) * dist_weight_factor;
            }
            tree.add_rave_value(child_idx, eval, weight);
        }
        if i == 0 {
            break;
        }
        if !ts.state.skip_rave(pm.mv) {
            let idx = ts.played_index(player, pm.mv);
            ts.was_played[idx] = true;
            ts.first_play[idx] = i as u32;
        }
        i -= 1;
    }

    // was_played を戻す
    loop {
        i += 1;
        if i >= nu_moves {
            break;
        }
        let pm = ts.simulation.moves[i];
        let idx = ts.played_index(pm.color, pm.mv);
        ts.was_played[idx] = false;
    }
}

fn update_lgr<S: GameState>(ctx: &SearchContext, ts: &mut ThreadState<S>) {
    let Some(lgr) = ctx.lgr.as_deref() else {
        return;
    };
    let sim = &ts.simulation;
    let nu_moves = sim.moves.len();
    if nu_moves == 0 {
        return;
    }
    let eval = &sim.eval;
    let mut max_eval = eval[0];
    for i in 1..ctx.nu_players {
        max_eval = max_eval.max(eval[i]);
    }
    // 引き分けは両者の勝ちとして扱う。追加情報なしに引き分けの扱いを
    // 決めるのは難しいが、Blokus Duo の実験では両者勝ち扱いが両者
    // 負け扱いよりわずかに良かった
    let mut is_winner = [false; MAX_PLAYERS];
    for (i, w) in is_winner.iter_mut().enumerate().take(ctx.nu_players) {
        *w = eval[i] == max_eval;
    }
    let mut last = sim.moves[0].mv;
    let mut second_last = Move::NULL;
    for i in 1..nu_moves {
        let reply = sim.moves[i];
        if is_winner[reply.color.index()] {
            lgr.store(reply.color, last, second_last, reply.mv);
        } else {
            lgr.forget(reply.color, last, second_last, reply.mv);
        }
        second_last = last;
        last = reply.mv;
    }
}
